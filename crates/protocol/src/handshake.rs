//! HELLO handshake: limit negotiation and manifest exchange.

use ciborium::value::{Integer, Value as Cbor};

use crate::errors::HandshakeError;
use crate::frame::{Frame, FrameType, RequestId};
use crate::io::{read_frame, write_frame};

const META_MAX_FRAME: &str = "max_frame";
const META_MAX_CHUNK: &str = "max_chunk";

/// Frame-size limits a peer is willing to accept. Carried in a HELLO
/// frame's `meta` map; negotiated by componentwise minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_frame: u64,
    pub max_chunk: u64,
}

impl Limits {
    pub const DEFAULT: Limits = Limits {
        max_frame: 1 << 20,
        max_chunk: 64 * 1024,
    };

    pub fn negotiate(a: Limits, b: Limits) -> Limits {
        Limits {
            max_frame: a.max_frame.min(b.max_frame),
            max_chunk: a.max_chunk.min(b.max_chunk),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Builds a HELLO frame carrying this side's proposed limits (in `meta`)
/// and its manifest bytes (in `payload`).
pub fn build_hello(id: RequestId, limits: Limits, manifest_bytes: Vec<u8>) -> Frame {
    let mut f = Frame::new(FrameType::Hello, id);
    f.meta.insert(
        META_MAX_FRAME.to_string(),
        Cbor::Integer(Integer::from(limits.max_frame)),
    );
    f.meta.insert(
        META_MAX_CHUNK.to_string(),
        Cbor::Integer(Integer::from(limits.max_chunk)),
    );
    f.payload = Some(manifest_bytes);
    f
}

impl Frame {
    /// Reads the `max_frame`/`max_chunk` pair out of a HELLO frame's
    /// `meta` map. `None` if this isn't a HELLO frame or either is absent.
    pub fn hello_limits(&self) -> Option<Limits> {
        if self.frame_type != FrameType::Hello {
            return None;
        }
        let max_frame = self
            .meta
            .get(META_MAX_FRAME)
            .and_then(Cbor::as_integer)
            .and_then(|i| u64::try_from(i).ok())?;
        let max_chunk = self
            .meta
            .get(META_MAX_CHUNK)
            .and_then(Cbor::as_integer)
            .and_then(|i| u64::try_from(i).ok())?;
        Some(Limits { max_frame, max_chunk })
    }

    /// The opaque manifest bytes carried in a HELLO frame's `payload`.
    pub fn hello_manifest(&self) -> Option<&[u8]> {
        if self.frame_type != FrameType::Hello {
            return None;
        }
        self.payload.as_deref()
    }
}

/// Host side of the handshake: writes our HELLO first (using a generous
/// upper bound so the peer's declared size is what actually governs),
/// then reads the plugin's HELLO and returns the negotiated limits plus
/// the plugin's raw manifest bytes.
pub fn host_handshake<W: std::io::Write, R: std::io::Read>(
    writer: &mut W,
    reader: &mut R,
    our_limits: Limits,
    our_manifest: Vec<u8>,
) -> Result<(Limits, Vec<u8>), HandshakeError> {
    let hello = build_hello(RequestId::new_uuid(), our_limits, our_manifest);
    write_frame(writer, &hello, Limits::DEFAULT.max_frame.max(our_limits.max_frame))?;

    let reply = read_frame(reader, our_limits.max_frame)?.ok_or_else(|| {
        HandshakeError::HandshakeFailed {
            reason: "peer closed before sending HELLO".to_string(),
        }
    })?;
    if reply.frame_type != FrameType::Hello {
        return Err(HandshakeError::HandshakeFailed {
            reason: format!("expected HELLO, got frame_type {:?}", reply.frame_type),
        });
    }
    let peer_limits = reply
        .hello_limits()
        .ok_or_else(|| HandshakeError::HandshakeFailed {
            reason: "peer HELLO missing max_frame/max_chunk".to_string(),
        })?;
    let manifest = reply
        .hello_manifest()
        .ok_or_else(|| HandshakeError::HandshakeFailed {
            reason: "peer HELLO missing manifest payload".to_string(),
        })?
        .to_vec();

    Ok((Limits::negotiate(our_limits, peer_limits), manifest))
}

/// Plugin side of the handshake: reads the host's HELLO first, then
/// replies with its own. Mirrors `host_handshake`'s framing but reversed
/// read/write order, matching a host-writes-first sequencing.
pub fn plugin_handshake<R: std::io::Read, W: std::io::Write>(
    reader: &mut R,
    writer: &mut W,
    our_limits: Limits,
    our_manifest: Vec<u8>,
) -> Result<(Limits, Vec<u8>), HandshakeError> {
    let incoming = read_frame(reader, Limits::DEFAULT.max_frame.max(our_limits.max_frame))?
        .ok_or_else(|| HandshakeError::HandshakeFailed {
            reason: "host closed before sending HELLO".to_string(),
        })?;
    if incoming.frame_type != FrameType::Hello {
        return Err(HandshakeError::HandshakeFailed {
            reason: format!("expected HELLO, got frame_type {:?}", incoming.frame_type),
        });
    }
    let host_limits = incoming
        .hello_limits()
        .ok_or_else(|| HandshakeError::HandshakeFailed {
            reason: "host HELLO missing max_frame/max_chunk".to_string(),
        })?;
    let host_manifest = incoming
        .hello_manifest()
        .ok_or_else(|| HandshakeError::HandshakeFailed {
            reason: "host HELLO missing manifest payload".to_string(),
        })?
        .to_vec();

    let negotiated = Limits::negotiate(our_limits, host_limits);
    let reply = build_hello(incoming.id.clone(), our_limits, our_manifest);
    write_frame(writer, &reply, negotiated.max_frame.max(our_limits.max_frame))?;

    Ok((negotiated, host_manifest))
}
