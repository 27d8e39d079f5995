//! Error taxonomy for the plugin-side runtime.

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum RuntimeError {
    #[snafu(display("no handler registered for capability '{cap}'"))]
    NoHandler { cap: String },

    #[snafu(display("invalid capability urn '{urn}': {source}"))]
    InvalidCapUrn { urn: String, source: capkey::CapKeyError },

    #[snafu(display("effective payload CBOR is malformed: {message}"))]
    MalformedPayload { message: String },

    #[snafu(display("effective payload CBOR top level must be an array of maps"))]
    PayloadNotArray,

    #[snafu(display("no payload entry matches declared input media type '{media_urn}'"))]
    NoMatchingMediaType { media_urn: String },

    #[snafu(display("handler for '{cap}' failed: {message}"))]
    HandlerFailed { cap: String, message: String },

    #[snafu(display("peer invocation not supported for capability '{cap}'"))]
    PeerInvokeNotSupported { cap: String },

    #[snafu(display("framing error: {source}"))]
    Frame { source: protocol::FrameError },
}

impl From<protocol::FrameError> for RuntimeError {
    fn from(source: protocol::FrameError) -> Self {
        RuntimeError::Frame { source }
    }
}
