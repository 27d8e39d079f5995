//! The plugin-side dispatcher: speaks the handshake, then reads REQ
//! frames and routes each to its registered handler in a tight
//! read/dispatch/respond loop that exits cleanly on EOF.

use std::collections::HashMap;
use std::io::{Read, Write};

use capkey::CapKey;
use protocol::{plugin_handshake, read_frame, write_frame, Frame, FrameType, Limits, Reassembler, RequestId};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::emitter::Emitter;
use crate::errors::RuntimeError;
use crate::payload::extract_effective_payload;
use crate::peer::{NoPeerInvoker, PeerInvoker};

type Handler = Box<dyn Fn(&CapKey, Vec<u8>, &mut Emitter<'_>, &dyn PeerInvoker) -> Result<(), RuntimeError> + Send + Sync>;

/// A REQ whose argument substream (`STREAM_START` → `CHUNK*` →
/// `STREAM_END`) hasn't closed yet, or whose payload arrived inline.
struct PendingRequest {
    cap_urn: String,
    content_type: Option<String>,
    reassembler: Reassembler,
}

pub struct PluginRuntime {
    handlers: HashMap<String, Handler>,
    peer_invoker: Box<dyn PeerInvoker>,
}

impl PluginRuntime {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            peer_invoker: Box::new(NoPeerInvoker),
        }
    }

    pub fn with_peer_invoker(mut self, invoker: Box<dyn PeerInvoker>) -> Self {
        self.peer_invoker = invoker;
        self
    }

    /// Registers a handler keyed by the exact canonical form of
    /// `cap_urn`. Re-registration replaces the prior handler.
    pub fn register_raw(
        &mut self,
        cap_urn: &str,
        handler: impl Fn(&CapKey, Vec<u8>, &mut Emitter<'_>, &dyn PeerInvoker) -> Result<(), RuntimeError>
            + Send
            + Sync
            + 'static,
    ) -> Result<(), RuntimeError> {
        let cap = CapKey::parse(cap_urn).map_err(|source| RuntimeError::InvalidCapUrn {
            urn: cap_urn.to_string(),
            source,
        })?;
        self.handlers.insert(cap.canonical(), Box::new(handler));
        Ok(())
    }

    /// Like `register_raw`, but deserializes the effective payload as
    /// JSON into `T` before calling `handler`.
    pub fn register<T, F>(&mut self, cap_urn: &str, handler: F) -> Result<(), RuntimeError>
    where
        T: DeserializeOwned,
        F: Fn(&CapKey, T, &mut Emitter<'_>, &dyn PeerInvoker) -> Result<(), RuntimeError> + Send + Sync + 'static,
    {
        self.register_raw(cap_urn, move |cap, payload, emitter, peer| {
            let value: T = serde_json::from_slice(&payload).map_err(|e| RuntimeError::HandlerFailed {
                cap: cap.canonical(),
                message: format!("failed to decode effective payload as JSON: {e}"),
            })?;
            handler(cap, value, emitter, peer)
        })
    }

    /// Runs the plugin loop: handshake, then read-dispatch-respond until
    /// the host closes its side. A request's arguments may arrive inline
    /// on its REQ frame, or as a trailing `STREAM_START`/`CHUNK*`/
    /// `STREAM_END` substream — either way the handler only runs once the
    /// full argument payload has been reassembled.
    pub fn run<R: Read, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
        our_limits: Limits,
        our_manifest: Vec<u8>,
    ) -> Result<(), RuntimeError> {
        let (negotiated, _host_manifest) = plugin_handshake(reader, writer, our_limits, our_manifest)
            .map_err(|e| RuntimeError::HandlerFailed {
                cap: "<handshake>".to_string(),
                message: e.to_string(),
            })?;

        let mut pending: HashMap<RequestId, PendingRequest> = HashMap::new();

        loop {
            let frame = match read_frame(reader, negotiated.max_frame)? {
                Some(f) => f,
                None => return Ok(()),
            };

            match frame.frame_type {
                FrameType::Req => self.start_request(frame, &mut pending, writer, negotiated)?,

                FrameType::StreamStart => {
                    // The reassembler for this id was already created when
                    // its REQ arrived; nothing to do until CHUNK/STREAM_END.
                }

                FrameType::Chunk => {
                    let id = frame.id.clone();
                    let Some(entry) = pending.get_mut(&id) else {
                        warn!(?frame, "CHUNK for unknown or already-dispatched request id");
                        continue;
                    };
                    if let Err(e) = entry.reassembler.accept_chunk(&frame) {
                        pending.remove(&id);
                        write_frame(writer, &Frame::with_error(id, "INVALID_PAYLOAD", e.to_string()), negotiated.max_frame)?;
                    }
                }

                FrameType::StreamEnd => {
                    let id = frame.id.clone();
                    match pending.remove(&id) {
                        Some(entry) => self.finish_request(id, entry, writer, negotiated)?,
                        None => warn!(?frame, "STREAM_END for unknown or already-dispatched request id"),
                    }
                }

                _ => warn!(?frame, "ignoring frame outside REQ/argument-substream types"),
            }
        }
    }

    /// Validates a REQ's capability and either dispatches it immediately
    /// (its payload arrived inline) or parks it in `pending` until its
    /// argument substream closes.
    fn start_request<W: Write>(
        &self,
        frame: Frame,
        pending: &mut HashMap<RequestId, PendingRequest>,
        writer: &mut W,
        limits: Limits,
    ) -> Result<(), RuntimeError> {
        let id = frame.id.clone();
        let reply_err = |code: &str, message: String| Frame::with_error(id.clone(), code, message);

        let Some(cap_urn) = frame.cap else {
            write_frame(writer, &reply_err("NO_HANDLER", "request missing cap field".to_string()), limits.max_frame)?;
            return Ok(());
        };

        let cap = match CapKey::parse(&cap_urn) {
            Ok(c) => c,
            Err(e) => {
                write_frame(writer, &reply_err("NO_HANDLER", e.to_string()), limits.max_frame)?;
                return Ok(());
            }
        };

        if !self.handlers.contains_key(&cap.canonical()) {
            write_frame(
                writer,
                &reply_err("NO_HANDLER", format!("no handler registered for '{}'", cap.canonical())),
                limits.max_frame,
            )?;
            return Ok(());
        }

        let mut reassembler = Reassembler::new();
        if let Some(payload) = frame.payload {
            reassembler.accept_end_payload(payload);
        }

        let entry = PendingRequest {
            cap_urn,
            content_type: frame.content_type,
            reassembler,
        };

        if entry.reassembler.is_complete() {
            self.finish_request(id, entry, writer, limits)
        } else {
            pending.insert(id, entry);
            Ok(())
        }
    }

    /// Extracts the effective payload from a fully reassembled request and
    /// runs its handler.
    fn finish_request<W: Write>(
        &self,
        id: RequestId,
        entry: PendingRequest,
        writer: &mut W,
        limits: Limits,
    ) -> Result<(), RuntimeError> {
        let reply_err = |code: &str, message: String| Frame::with_error(id.clone(), code, message);

        let cap = CapKey::parse(&entry.cap_urn).expect("validated when the REQ frame was read");

        let Some(handler) = self.handlers.get(&cap.canonical()) else {
            write_frame(
                writer,
                &reply_err("NO_HANDLER", format!("no handler registered for '{}'", cap.canonical())),
                limits.max_frame,
            )?;
            return Ok(());
        };

        let raw_payload = entry.reassembler.concatenated();
        let effective = match extract_effective_payload(entry.content_type.as_deref(), &raw_payload, &entry.cap_urn) {
            Ok(bytes) => bytes,
            Err(e) => {
                write_frame(writer, &reply_err("INVALID_PAYLOAD", e.to_string()), limits.max_frame)?;
                return Ok(());
            }
        };

        debug!(cap = %cap.canonical(), bytes = effective.len(), "dispatching request");
        let mut emitter = Emitter::new(&mut *writer, id.clone(), limits);
        if let Err(e) = handler(&cap, effective, &mut emitter, self.peer_invoker.as_ref()) {
            write_frame(writer, &reply_err("HANDLER_FAILED", e.to_string()), limits.max_frame)?;
        }
        Ok(())
    }
}

impl Default for PluginRuntime {
    fn default() -> Self {
        Self::new()
    }
}
