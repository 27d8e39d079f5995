//! Capability records, plugin manifests, and the schema validator that
//! checks runtime calls against a capability's declared argument/output
//! shape.

mod errors;
mod types;
mod validator;

pub use errors::*;
pub use types::{Arg, Arguments, Capability, Manifest, Output, ValueType, Validation};
pub use validator::SchemaValidator;
