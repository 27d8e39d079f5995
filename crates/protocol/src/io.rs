//! Length-prefixed frame I/O: `uint32be length || cbor_frame`.

use std::io::{Read, Write};

use crate::errors::FrameError;
use crate::frame::Frame;

/// Reads one frame, bounded by `max_frame` bytes of CBOR body.
///
/// Returns `Ok(None)` on clean EOF before any length byte is read.
/// Truncation mid-prefix or mid-body is an `Io` error. A declared length
/// exceeding `max_frame` is rejected with `FrameTooLarge` *without*
/// consuming the body.
pub fn read_frame<R: Read>(reader: &mut R, max_frame: u64) -> Result<Option<Frame>, FrameError> {
    let mut len_buf = [0u8; 4];
    match read_exact_or_eof(reader, &mut len_buf)? {
        false => return Ok(None),
        true => {}
    }
    let len = u32::from_be_bytes(len_buf) as u64;
    if len > max_frame {
        return Err(FrameError::FrameTooLarge {
            size: len as usize,
            max: max_frame as usize,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader
        .read_exact(&mut body)
        .map_err(|source| FrameError::Io { source })?;

    let value: ciborium::value::Value =
        ciborium::de::from_reader(body.as_slice()).map_err(|e| FrameError::InvalidFrame {
            reason: e.to_string(),
        })?;

    Frame::from_cbor(value).map(Some)
}

/// Writes one frame. If the encoded body would exceed `max_frame`, returns
/// `FrameTooLarge` without writing any bytes.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, frame: &Frame, max_frame: u64) -> Result<(), FrameError> {
    let mut body = Vec::new();
    ciborium::ser::into_writer(&frame.to_cbor(), &mut body).map_err(|e| FrameError::InvalidFrame {
        reason: e.to_string(),
    })?;

    if body.len() as u64 > max_frame {
        return Err(FrameError::FrameTooLarge {
            size: body.len(),
            max: max_frame as usize,
        });
    }

    let len = body.len() as u32;
    writer
        .write_all(&len.to_be_bytes())
        .map_err(|source| FrameError::Io { source })?;
    writer
        .write_all(&body)
        .map_err(|source| FrameError::Io { source })?;
    writer.flush().map_err(|source| FrameError::Io { source })?;
    Ok(())
}

/// Like `Read::read_exact`, but returns `Ok(false)` instead of an
/// `UnexpectedEof` error when zero bytes were available before the read
/// even began (a clean stream close between frames).
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, FrameError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(FrameError::Io {
                    source: std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "truncated frame length prefix",
                    ),
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(FrameError::Io { source }),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameType, RequestId};

    #[test]
    fn read_returns_none_on_clean_eof() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor, 1024).unwrap().is_none());
    }

    #[test]
    fn read_errors_on_truncated_prefix() {
        let mut cursor = std::io::Cursor::new(vec![0u8, 1]);
        assert!(read_frame(&mut cursor, 1024).is_err());
    }

    #[test]
    fn write_then_read_roundtrip() {
        let f = Frame::new(FrameType::Hello, RequestId::Int(1));
        let mut buf = Vec::new();
        write_frame(&mut buf, &f, 1024).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_frame(&mut cursor, 1024).unwrap().unwrap();
        assert_eq!(decoded, f);
    }

    #[test]
    fn write_rejects_oversized_frame_without_partial_write() {
        let mut f = Frame::new(FrameType::Chunk, RequestId::Int(1));
        f.payload = Some(vec![0u8; 100]);
        let mut buf = Vec::new();
        let err = write_frame(&mut buf, &f, 10).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn read_rejects_oversized_declared_length_without_consuming_body() {
        let mut f = Frame::new(FrameType::Chunk, RequestId::Int(1));
        f.payload = Some(vec![0u8; 100]);
        let mut buf = Vec::new();
        write_frame(&mut buf, &f, 1_000_000).unwrap();

        let mut cursor = std::io::Cursor::new(buf.clone());
        let err = read_frame(&mut cursor, 10).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { .. }));
        // body bytes were never consumed: only the 4-byte length prefix was read
        assert_eq!(cursor.position(), 4);
    }
}
