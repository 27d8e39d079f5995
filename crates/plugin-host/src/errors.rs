//! Error taxonomy for plugin spawning, handshake, and routing failures.

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum HostError {
    #[snafu(display("failed to spawn plugin at {path}: {source}"))]
    Spawn { path: String, source: std::io::Error },

    #[snafu(display("plugin at {path} failed its handshake: {source}"))]
    Handshake {
        path: String,
        source: protocol::HandshakeError,
    },

    #[snafu(display("manifest from plugin at {path} is invalid: {source}"))]
    InvalidManifest {
        path: String,
        source: manifest::ManifestError,
    },

    #[snafu(display("no plugin declares a capability matching '{cap}'"))]
    NoHandler { cap: String },

    #[snafu(display("framing error while talking to plugin '{plugin}': {source}"))]
    Frame {
        plugin: String,
        source: protocol::FrameError,
    },

    #[snafu(display("no peer router configured to handle relay frame from '{plugin}'"))]
    NoPeerRoute { plugin: String },
}
