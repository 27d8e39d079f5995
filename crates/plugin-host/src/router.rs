//! Routing table over registered plugins' capabilities, and the hook a
//! host uses to resolve frames a plugin addresses to another peer.
//!
//! The routing table is an exact canonical-cap-string → plugin index map
//! (REQ frames already carry a resolved capability id by the time they
//! reach the host); the richer wildcard ranking in `capkey::find_best` is
//! for a caller upstream of the host to pick *which* capability id to
//! request in the first place.

use std::collections::HashMap;

use capkey::CapKey;

use crate::errors::HostError;

/// canonical cap string → plugin index. On a colliding canonical string,
/// the most recently attached plugin wins.
#[derive(Debug, Default)]
pub(crate) struct RoutingTable {
    by_canonical: HashMap<String, usize>,
}

impl RoutingTable {
    pub fn insert(&mut self, cap: &CapKey, plugin_idx: usize) {
        self.by_canonical.insert(cap.canonical(), plugin_idx);
    }

    pub fn lookup(&self, cap: &CapKey) -> Option<usize> {
        self.by_canonical.get(&cap.canonical()).copied()
    }

    pub fn lookup_str(&self, canonical: &str) -> Option<usize> {
        self.by_canonical.get(canonical).copied()
    }
}

/// Resolves capability requests one plugin makes that target another
/// plugin or the host itself, rather than the engine that opened the
/// connection.
///
/// The default (`NoPeerRouter`) rejects every such request — a host only
/// needs a real implementation once it supports plugin-to-plugin calls.
pub trait PeerRouter: Send + Sync {
    fn route(&self, from_plugin: &str, cap: &CapKey) -> Result<usize, HostError>;
}

pub struct NoPeerRouter;

impl PeerRouter for NoPeerRouter {
    fn route(&self, from_plugin: &str, _cap: &CapKey) -> Result<usize, HostError> {
        Err(HostError::NoPeerRoute {
            plugin: from_plugin.to_string(),
        })
    }
}
