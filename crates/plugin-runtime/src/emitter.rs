//! Writes a handler's response onto the outbound
//! `STREAM_START`/`CHUNK*`/`STREAM_END`/`END` sequence.

use std::io::Write;

use protocol::{write_frame, write_stream, Frame, FrameType, Limits, RequestId};

use crate::errors::RuntimeError;

pub struct Emitter<'w> {
    writer: &'w mut dyn Write,
    id: RequestId,
    limits: Limits,
    stream_seq: u32,
}

impl<'w> Emitter<'w> {
    pub fn new(writer: &'w mut dyn Write, id: RequestId, limits: Limits) -> Self {
        Self { writer, id, limits, stream_seq: 0 }
    }

    /// Emits one complete output substream: `STREAM_START`, chunked
    /// `data`, then `STREAM_END`. Safe to call more than once per request
    /// for handlers that produce multiple named outputs.
    pub fn emit_stream(&mut self, content_type: &str, data: &[u8]) -> Result<(), RuntimeError> {
        let stream_id = format!("out-{}", self.stream_seq);
        self.stream_seq += 1;
        write_stream(
            self.writer,
            self.id.clone(),
            &stream_id,
            content_type,
            data,
            self.limits.max_chunk as usize,
            self.limits.max_frame,
        )?;
        Ok(())
    }

    /// Terminates the request with a plain `END` frame (no output body).
    pub fn end(&mut self) -> Result<(), RuntimeError> {
        let frame = Frame::new(FrameType::End, self.id.clone());
        write_frame(self.writer, &frame, self.limits.max_frame)?;
        Ok(())
    }
}
