//! Plugin-to-peer invocation hook.

use crate::errors::RuntimeError;

/// Lets a handler call another capability — another plugin, or one
/// hosted by the engine — instead of the one it was invoked for.
///
/// The default (`NoPeerInvoker`) rejects every call with
/// `PeerInvokeNotSupported`, carrying the exact cap URN string.
pub trait PeerInvoker: Send + Sync {
    fn invoke(&self, cap_urn: &str, payload: &[u8]) -> Result<Vec<u8>, RuntimeError>;
}

pub struct NoPeerInvoker;

impl PeerInvoker for NoPeerInvoker {
    fn invoke(&self, cap_urn: &str, _payload: &[u8]) -> Result<Vec<u8>, RuntimeError> {
        Err(RuntimeError::PeerInvokeNotSupported { cap: cap_urn.to_string() })
    }
}
