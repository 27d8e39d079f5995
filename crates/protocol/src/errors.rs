//! Error taxonomy for framing and handshake failures.

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum FrameError {
    #[snafu(display("invalid frame: {reason}"))]
    InvalidFrame { reason: String },

    #[snafu(display("frame of {size} bytes exceeds the negotiated limit of {max} bytes"))]
    FrameTooLarge { size: usize, max: usize },

    #[snafu(display("i/o error: {source}"))]
    Io { source: std::io::Error },
}

#[derive(Debug, Snafu)]
pub enum HandshakeError {
    #[snafu(display("handshake failed: {reason}"))]
    HandshakeFailed { reason: String },

    #[snafu(display("handshake framing error: {source}"))]
    Frame { source: FrameError },
}

impl From<FrameError> for HandshakeError {
    fn from(source: FrameError) -> Self {
        HandshakeError::Frame { source }
    }
}
