//! Error taxonomy for manifest decoding and schema validation.

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum ManifestError {
    #[snafu(display("invalid manifest JSON: {source}"))]
    Json { source: serde_json::Error },

    #[snafu(display("invalid manifest CBOR: {message}"))]
    Cbor { message: String },

    #[snafu(display("capability schema invalid for argument '{argument}': {reason}"))]
    InvalidCapabilitySchema { argument: String, reason: String },

    #[snafu(display("missing required argument '{name}'"))]
    MissingRequiredArgument { name: String },

    #[snafu(display("too many arguments: provided {provided}, capability declares at most {max}"))]
    TooManyArguments { provided: usize, max: usize },

    #[snafu(display("argument '{name}' has the wrong type, expected {expected}"))]
    InvalidArgumentType { name: String, expected: String },

    #[snafu(display("argument '{name}' failed rule '{rule}' (value: {value})"))]
    ArgumentValidationFailed {
        name: String,
        rule: String,
        value: String,
    },

    #[snafu(display("output has the wrong type, expected {expected}"))]
    InvalidOutputType { expected: String },

    #[snafu(display("output failed rule '{rule}' (value: {value})"))]
    OutputValidationFailed { rule: String, value: String },

    #[snafu(display("capability '{cap}' is unknown"))]
    UnknownCapability { cap: String },
}
