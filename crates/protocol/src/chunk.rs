//! Chunked substream writing and reassembly.

use std::collections::BTreeMap;
use std::io::Write;

use crate::errors::FrameError;
use crate::frame::{Frame, FrameType, RequestId};
use crate::io::write_frame;

/// Splits `data` into CHUNK frames of at most `max_chunk` bytes.
///
/// The first chunk carries `len` (the total size) and `content_type`;
/// later chunks omit `len`; the last chunk sets `eof = true`. Empty data
/// produces a single zero-length chunk with `eof = true`. This only builds
/// CHUNK frames — callers that haven't already opened the substream are
/// responsible for writing `STREAM_START`/`STREAM_END` around them.
pub fn chunk_frames(
    id: RequestId,
    stream_id: &str,
    content_type: &str,
    data: &[u8],
    max_chunk: usize,
) -> Vec<Frame> {
    let total = data.len() as u64;

    if data.is_empty() {
        let mut f = Frame::new(FrameType::Chunk, id);
        f.stream_id = Some(stream_id.to_string());
        f.content_type = Some(content_type.to_string());
        f.seq = Some(0);
        f.offset = Some(0);
        f.len = Some(0);
        f.payload = Some(Vec::new());
        f.eof = Some(true);
        return vec![f];
    }

    let mut frames = Vec::new();
    let mut offset = 0usize;
    let mut seq = 0u64;
    while offset < data.len() {
        let end = (offset + max_chunk).min(data.len());
        let is_last = end == data.len();

        let mut f = Frame::new(FrameType::Chunk, id.clone());
        f.stream_id = Some(stream_id.to_string());
        f.seq = Some(seq);
        f.offset = Some(offset as u64);
        f.payload = Some(data[offset..end].to_vec());
        if seq == 0 {
            f.len = Some(total);
            f.content_type = Some(content_type.to_string());
        }
        if is_last {
            f.eof = Some(true);
        }
        frames.push(f);

        offset = end;
        seq += 1;
    }
    frames
}

/// Writes a full substream: `STREAM_START`, the chunked payload, then
/// `STREAM_END`.
pub fn write_stream<W: Write + ?Sized>(
    writer: &mut W,
    id: RequestId,
    stream_id: &str,
    content_type: &str,
    data: &[u8],
    max_chunk: usize,
    max_frame: u64,
) -> Result<(), FrameError> {
    let mut start = Frame::new(FrameType::StreamStart, id.clone());
    start.stream_id = Some(stream_id.to_string());
    start.media_urn = Some(content_type.to_string());
    write_frame(writer, &start, max_frame)?;

    for chunk in chunk_frames(id.clone(), stream_id, content_type, data, max_chunk) {
        write_frame(writer, &chunk, max_frame)?;
    }

    let mut end = Frame::new(FrameType::StreamEnd, id);
    end.stream_id = Some(stream_id.to_string());
    write_frame(writer, &end, max_frame)?;
    Ok(())
}

/// Reassembles CHUNK payloads for one `(id, stream_id)` substream in `seq`
/// order. `concatenated()` is the full logical byte string (including any
/// payload carried by the terminating END frame); `final_payload()` is only
/// the last chunk's bytes — the two diverge for multi-chunk streams and
/// callers must pick deliberately.
#[derive(Debug, Default)]
pub struct Reassembler {
    chunks: BTreeMap<u64, Vec<u8>>,
    eof: bool,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts the next CHUNK frame. `seq` must be contiguous and start at
    /// zero; a gap or repeat is an `InvalidFrame` error.
    pub fn accept_chunk(&mut self, frame: &Frame) -> Result<(), FrameError> {
        let seq = frame.seq.ok_or_else(|| FrameError::InvalidFrame {
            reason: "CHUNK frame missing seq".to_string(),
        })?;
        let expected = self.chunks.len() as u64;
        if seq != expected {
            return Err(FrameError::InvalidFrame {
                reason: format!("expected chunk seq {expected}, got {seq}"),
            });
        }
        self.chunks.insert(seq, frame.payload.clone().unwrap_or_default());
        if frame.eof == Some(true) {
            self.eof = true;
        }
        Ok(())
    }

    /// Folds in the payload an END frame carried, treating it as the final
    /// logical chunk.
    pub fn accept_end_payload(&mut self, payload: Vec<u8>) {
        if !payload.is_empty() {
            let next_seq = self.chunks.len() as u64;
            self.chunks.insert(next_seq, payload);
        }
        self.eof = true;
    }

    pub fn is_complete(&self) -> bool {
        self.eof
    }

    pub fn concatenated(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in self.chunks.values() {
            out.extend_from_slice(chunk);
        }
        out
    }

    pub fn final_payload(&self) -> Option<&[u8]> {
        self.chunks.values().next_back().map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(frames: &[Frame]) -> Reassembler {
        let mut r = Reassembler::new();
        for f in frames {
            r.accept_chunk(f).unwrap();
        }
        r
    }

    #[test]
    fn empty_data_is_single_eof_chunk() {
        let frames = chunk_frames(RequestId::Int(1), "args", "application/cbor", b"", 100);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len, Some(0));
        assert_eq!(frames[0].eof, Some(true));
    }

    #[test]
    fn exact_max_chunk_is_one_frame() {
        let data = vec![7u8; 100];
        let frames = chunk_frames(RequestId::Int(1), "args", "application/cbor", &data, 100);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].eof, Some(true));
        assert_eq!(frames[0].len, Some(100));
    }

    #[test]
    fn max_chunk_plus_one_is_two_frames() {
        let data = vec![7u8; 101];
        let frames = chunk_frames(RequestId::Int(1), "args", "application/cbor", &data, 100);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len, Some(101));
        assert_eq!(frames[0].eof, None);
        assert_eq!(frames[1].eof, Some(true));
    }

    #[test]
    fn auto_chunking_250_over_100() {
        let data = vec![9u8; 250];
        let frames = chunk_frames(RequestId::Int(1), "args", "application/cbor", &data, 100);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload.as_ref().unwrap().len(), 100);
        assert_eq!(frames[1].payload.as_ref().unwrap().len(), 100);
        assert_eq!(frames[2].payload.as_ref().unwrap().len(), 50);
        assert_eq!(frames[2].eof, Some(true));

        let reassembled = feed(&frames).concatenated();
        assert_eq!(reassembled, data);
    }

    #[test]
    fn reassembly_roundtrip_for_arbitrary_sizes() {
        for len in [0usize, 1, 99, 100, 101, 999] {
            let data: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
            let frames = chunk_frames(RequestId::Int(1), "s", "application/cbor", &data, 100);
            assert_eq!(feed(&frames).concatenated(), data);
        }
    }

    #[test]
    fn out_of_order_seq_is_rejected() {
        let data = vec![1u8; 250];
        let frames = chunk_frames(RequestId::Int(1), "s", "application/cbor", &data, 100);
        let mut r = Reassembler::new();
        r.accept_chunk(&frames[0]).unwrap();
        assert!(r.accept_chunk(&frames[2]).is_err());
    }

    #[test]
    fn final_payload_diverges_from_concatenated_on_multi_chunk() {
        let data = vec![5u8; 250];
        let frames = chunk_frames(RequestId::Int(1), "s", "application/cbor", &data, 100);
        let r = feed(&frames);
        assert_eq!(r.final_payload().unwrap().len(), 50);
        assert_eq!(r.concatenated().len(), 250);
    }
}
