//! Length-prefixed CBOR frame codec, chunked substream multiplexing, and
//! the HELLO handshake used between a plugin host and its subprocess
//! plugins.

mod chunk;
mod errors;
mod frame;
mod handshake;
mod io;

pub use chunk::{chunk_frames, write_stream, Reassembler};
pub use errors::{FrameError, HandshakeError};
pub use frame::{Frame, FrameType, RequestId, PROTOCOL_VERSION};
pub use handshake::{build_hello, host_handshake, plugin_handshake, Limits};
pub use io::{read_frame, write_frame};
