//! N-to-1 plugin host: spawns stdio subprocess plugins, negotiates their
//! HELLO handshake, and relays capability requests to whichever plugin
//! advertises them.

mod errors;
mod host;
mod plugin;
mod router;

pub use errors::HostError;
pub use host::PluginHost;
pub use plugin::PluginProcess;
pub use router::{NoPeerRouter, PeerRouter};

#[cfg(test)]
mod tests {
    use super::*;
    use capkey::CapKey;
    use manifest::{Arguments, Capability, Manifest};
    use protocol::Limits;
    use std::collections::HashMap;

    fn fake_manifest(caps: Vec<&str>) -> Manifest {
        Manifest {
            name: "fake".to_string(),
            version: "1.0.0".to_string(),
            description: "test plugin".to_string(),
            author: None,
            caps: caps
                .into_iter()
                .map(|c| Capability {
                    key: CapKey::parse(c).unwrap(),
                    version: "1.0.0".to_string(),
                    command: "run".to_string(),
                    description: None,
                    metadata: HashMap::new(),
                    accepts_stdin: false,
                    arguments: Arguments::default(),
                    output: None,
                })
                .collect(),
        }
    }

    #[test]
    fn routing_table_does_exact_canonical_lookup() {
        let mut table = crate::router::RoutingTable::default();
        let wildcard = CapKey::parse("action=transform;type=*").unwrap();
        let exact = CapKey::parse("action=transform;type=data_processing").unwrap();
        table.insert(&wildcard, 0);
        table.insert(&exact, 1);

        assert_eq!(table.lookup(&exact), Some(1));
        assert_eq!(table.lookup(&wildcard), Some(0));
        let unregistered = CapKey::parse("action=transform;type=other").unwrap();
        assert_eq!(table.lookup(&unregistered), None);
    }

    #[test]
    fn later_attach_wins_on_canonical_collision() {
        let mut table = crate::router::RoutingTable::default();
        let cap = CapKey::parse("action=read").unwrap();
        table.insert(&cap, 0);
        table.insert(&cap, 1);
        assert_eq!(table.lookup(&cap), Some(1));
    }

    #[test]
    fn fake_manifest_helper_produces_parseable_caps() {
        let manifest = fake_manifest(vec!["action=transform;type=data_processing"]);
        assert_eq!(manifest.caps.len(), 1);
    }

    #[test]
    fn no_peer_router_rejects_every_route() {
        let router = crate::router::NoPeerRouter;
        let cap = CapKey::parse("action=read").unwrap();
        assert!(router.route("plugin-a", &cap).is_err());
    }

    #[test]
    fn default_limits_are_usable_for_registration_calls() {
        // Exercises the Limits type this crate re-exports from `protocol`
        // so a host can construct sane defaults without reaching into
        // that crate directly.
        let limits = Limits::DEFAULT;
        assert!(limits.max_frame > 0);
        assert!(limits.max_chunk > 0);
    }
}
