//! The N-to-1 plugin host: owns every spawned plugin process, routes
//! capability requests to whichever one advertises them, and relays
//! frames between an engine and that set of plugins.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use capkey::CapKey;
use manifest::Capability;
use protocol::{read_frame, write_frame, Frame, FrameType, Limits, RequestId};
use tracing::{info, warn};

use crate::errors::HostError;
use crate::plugin::PluginProcess;
use crate::router::{NoPeerRouter, PeerRouter, RoutingTable};

/// A routing table slot: either a path whose capabilities are routable
/// before it's ever spawned, or a live, handshaken process.
enum PluginSlot {
    Planned { path: PathBuf },
    Attached(PluginProcess),
}

pub struct PluginHost {
    plugins: Vec<PluginSlot>,
    routes: RoutingTable,
    peer_router: Box<dyn PeerRouter>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            routes: RoutingTable::default(),
            peer_router: Box::new(NoPeerRouter),
        }
    }

    pub fn with_peer_router(mut self, router: Box<dyn PeerRouter>) -> Self {
        self.peer_router = router;
        self
    }

    /// Adds a planned entry for `path` without any I/O: each capability in
    /// `known_caps` becomes routable immediately, so a cold-start request
    /// can resolve to this plugin before it's ever attached. A `known_caps`
    /// entry that fails to parse as a capability id is logged and skipped
    /// rather than rejecting the whole call — it's a hint, not the
    /// authoritative source (the plugin's own manifest is, once attached).
    pub fn register_plugin(&mut self, path: &Path, known_caps: &[String]) -> usize {
        let idx = self.plugins.len();
        for raw in known_caps {
            match CapKey::parse(raw) {
                Ok(cap) => self.routes.insert(&cap, idx),
                Err(e) => warn!(cap = %raw, error = %e, "skipping unparsable known_caps entry"),
            }
        }
        self.plugins.push(PluginSlot::Planned { path: path.to_path_buf() });
        idx
    }

    /// Spawns the plugin at `path`, performs its HELLO handshake, and
    /// indexes its advertised capabilities into the routing table —
    /// overwriting any planned entries for the same capability. Fills the
    /// slot a prior `register_plugin` call planned for this path, if one
    /// exists, otherwise appends a new one.
    pub fn attach_plugin(&mut self, path: &Path, our_limits: Limits, our_manifest: &[u8]) -> Result<usize, HostError> {
        let process = PluginProcess::spawn(path, our_limits, our_manifest)?;

        let idx = self
            .plugins
            .iter()
            .position(|slot| matches!(slot, PluginSlot::Planned { path: p } if p.as_path() == path))
            .unwrap_or(self.plugins.len());

        if idx == self.plugins.len() {
            self.plugins.push(PluginSlot::Attached(process));
        } else {
            self.plugins[idx] = PluginSlot::Attached(process);
        }

        let PluginSlot::Attached(attached) = &self.plugins[idx] else {
            unreachable!("just inserted an Attached slot at this index")
        };
        for cap in &attached.manifest.caps {
            self.routes.insert(&cap.key, idx);
        }
        info!(plugin = %attached.manifest.name, caps = attached.manifest.caps.len(), "plugin attached");
        Ok(idx)
    }

    fn attached(&self, idx: usize) -> Option<&PluginProcess> {
        match self.plugins.get(idx)? {
            PluginSlot::Attached(p) => Some(p),
            PluginSlot::Planned { .. } => None,
        }
    }

    /// Exact canonical-string lookup: the plugin (and its capability
    /// record) that declared `request` verbatim. `None` if no plugin
    /// declares it, it's only a planned (not yet attached) entry, or the
    /// attached process has since exited.
    pub fn find_plugin_for_cap(&self, request: &CapKey) -> Option<(&PluginProcess, &Capability)> {
        let idx = self.routes.lookup(request)?;
        let plugin = self.attached(idx)?;
        if !plugin.is_alive() {
            return None;
        }
        let capability = plugin.manifest.caps.iter().find(|c| &c.key == request)?;
        Some((plugin, capability))
    }

    /// Every capability every live, attached plugin advertises, in
    /// registration order. A plugin that's only planned, or has exited,
    /// contributes nothing — this is rebuilt from the current set of
    /// running plugins on every call.
    pub fn capabilities(&self) -> Vec<&Capability> {
        self.plugins
            .iter()
            .filter_map(|slot| match slot {
                PluginSlot::Attached(p) if p.is_alive() => Some(p),
                _ => None,
            })
            .flat_map(|p| p.manifest.caps.iter())
            .collect()
    }

    /// Relays frames between an engine (`reader`/`writer`) and every
    /// attached plugin. One reader thread per attached plugin forwards
    /// that plugin's frames back to the engine — echoing HEARTBEAT to the
    /// plugin only, never to the engine — while the calling thread reads
    /// engine frames and routes each `REQ` to the plugin that declared its
    /// capability, or emits `NO_HANDLER` if none does. Returns once the
    /// engine closes its side.
    pub fn run<R: Read, W: Write + Send>(&self, reader: &mut R, writer: W) -> Result<(), HostError> {
        let writer = Mutex::new(writer);
        let in_flight: Mutex<HashMap<RequestId, usize>> = Mutex::new(HashMap::new());

        std::thread::scope(|scope| {
            for idx in 0..self.plugins.len() {
                if self.attached(idx).is_none() {
                    continue;
                }
                let writer = &writer;
                let in_flight = &in_flight;
                scope.spawn(move || self.plugin_reader_loop(idx, writer, in_flight));
            }

            loop {
                let frame = match read_frame(reader, Limits::DEFAULT.max_frame) {
                    Ok(Some(f)) => f,
                    Ok(None) => break Ok(()),
                    Err(source) => {
                        break Err(HostError::Frame {
                            plugin: "<engine>".to_string(),
                            source,
                        })
                    }
                };

                if frame.frame_type == FrameType::Req {
                    self.route_request(frame, &writer, &in_flight);
                    continue;
                }

                let target = in_flight.lock().unwrap_or_else(|p| p.into_inner()).get(&frame.id).copied();
                match target.and_then(|idx| self.attached(idx)) {
                    Some(plugin) => {
                        if frame.frame_type == FrameType::End {
                            in_flight.lock().unwrap_or_else(|p| p.into_inner()).remove(&frame.id);
                        }
                        if let Err(e) = plugin.send(&frame) {
                            warn!(error = %e, "failed to forward engine frame to plugin");
                        }
                    }
                    None => warn!(?frame, "engine frame for unknown or already-closed request id"),
                }
            }
        })
    }

    fn route_request<W: Write>(
        &self,
        frame: Frame,
        writer: &Mutex<W>,
        in_flight: &Mutex<HashMap<RequestId, usize>>,
    ) {
        let Some(cap_str) = frame.cap.clone() else {
            self.reply_engine(writer, Frame::with_error(frame.id, "NO_HANDLER", "request missing cap field".to_string()));
            return;
        };
        let cap = match CapKey::parse(&cap_str) {
            Ok(c) => c,
            Err(_) => {
                self.reply_engine(
                    writer,
                    Frame::with_error(frame.id, "NO_HANDLER", format!("invalid capability urn '{cap_str}'")),
                );
                return;
            }
        };
        let Some(idx) = self.routes.lookup(&cap) else {
            self.reply_engine(
                writer,
                Frame::with_error(frame.id, "NO_HANDLER", format!("no plugin declares a capability matching '{cap_str}'")),
            );
            return;
        };
        let Some(plugin) = self.attached(idx) else {
            self.reply_engine(
                writer,
                Frame::with_error(frame.id, "NO_HANDLER", format!("plugin for '{cap_str}' is not yet attached")),
            );
            return;
        };
        if !plugin.is_alive() {
            self.reply_engine(
                writer,
                Frame::with_error(frame.id, "NO_HANDLER", format!("plugin for '{cap_str}' has exited")),
            );
            return;
        }

        in_flight.lock().unwrap_or_else(|p| p.into_inner()).insert(frame.id.clone(), idx);
        if let Err(e) = plugin.send(&frame) {
            warn!(error = %e, "failed to forward REQ to plugin");
        }
    }

    /// Continuously forwards one plugin's outbound frames to the engine
    /// until the plugin closes its stdout or a read fails. HEARTBEAT is
    /// echoed back to the plugin and never reaches the engine. On exit,
    /// any request ids still routed to this plugin are abandoned with an
    /// ERR to the engine.
    fn plugin_reader_loop<W: Write>(
        &self,
        idx: usize,
        writer: &Mutex<W>,
        in_flight: &Mutex<HashMap<RequestId, usize>>,
    ) {
        let Some(plugin) = self.attached(idx) else { return };
        loop {
            let frame = match plugin.recv() {
                Ok(Some(f)) => f,
                Ok(None) => {
                    self.abandon_in_flight(idx, "CLOSED", writer, in_flight);
                    return;
                }
                Err(e) => {
                    warn!(plugin = %plugin.manifest.name, error = %e, "plugin read failed");
                    self.abandon_in_flight(idx, "PROCESS_EXITED", writer, in_flight);
                    return;
                }
            };

            match frame.frame_type {
                FrameType::Heartbeat => {
                    if let Err(e) = plugin.send(&frame) {
                        warn!(error = %e, "failed to echo heartbeat to plugin");
                    }
                }
                FrameType::End => {
                    in_flight.lock().unwrap_or_else(|p| p.into_inner()).remove(&frame.id);
                    self.reply_engine(writer, frame);
                }
                _ => self.reply_engine(writer, frame),
            }
        }
    }

    fn abandon_in_flight<W: Write>(
        &self,
        idx: usize,
        code: &str,
        writer: &Mutex<W>,
        in_flight: &Mutex<HashMap<RequestId, usize>>,
    ) {
        let ids: Vec<RequestId> = {
            let mut guard = in_flight.lock().unwrap_or_else(|p| p.into_inner());
            let ids: Vec<RequestId> = guard.iter().filter(|(_, &v)| v == idx).map(|(id, _)| id.clone()).collect();
            for id in &ids {
                guard.remove(id);
            }
            ids
        };
        for id in ids {
            self.reply_engine(writer, Frame::with_error(id, code, "plugin became unavailable while a request was in flight".to_string()));
        }
    }

    fn reply_engine<W: Write>(&self, writer: &Mutex<W>, frame: Frame) {
        let mut guard = writer.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = write_frame(&mut *guard, &frame, Limits::DEFAULT.max_frame) {
            warn!(error = %e, "failed to write relay frame to engine");
        }
    }
}

impl Default for PluginHost {
    fn default() -> Self {
        Self::new()
    }
}
