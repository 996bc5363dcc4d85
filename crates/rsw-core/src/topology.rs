//! Nexthop topology derived from the router list each pass.

use std::collections::BTreeMap;

use crate::document::RouterConfig;

/// Maps every owned next-hop address to its backup peer and to the
/// healthcheck address of the router that owns it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    backups: BTreeMap<String, String>,
    owners: BTreeMap<String, String>,
}

impl Topology {
    pub fn from_routers(routers: &[RouterConfig]) -> Self {
        let mut topology = Self::default();
        for router in routers {
            for (own, backup) in router.interfaces.iter().filter_map(|i| i.nexthop_pair()) {
                topology
                    .backups
                    .insert(own.to_string(), backup.to_string());
                topology
                    .owners
                    .insert(own.to_string(), router.healthcheck_address.clone());
            }
        }
        topology
    }

    pub fn is_owned(&self, next_hop: &str) -> bool {
        self.owners.contains_key(next_hop)
    }

    pub fn backup_of(&self, next_hop: &str) -> Option<&str> {
        self.backups.get(next_hop).map(String::as_str)
    }

    pub fn owner_of(&self, next_hop: &str) -> Option<&str> {
        self.owners.get(next_hop).map(String::as_str)
    }

    /// `(next hop, owning router)` pairs.
    pub fn owned(&self) -> impl Iterator<Item = (&str, &str)> {
        self.owners.iter().map(|(hop, owner)| (hop.as_str(), owner.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::InterfaceConfig;

    fn router(hc: &str, pairs: &[(&str, &str)]) -> RouterConfig {
        RouterConfig {
            healthcheck_address: hc.into(),
            interfaces: pairs
                .iter()
                .map(|(own, backup)| InterfaceConfig {
                    own_ip: Some((*own).into()),
                    backup_peer_ip: Some((*backup).into()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_topology_maps_backups_and_owners() {
        let topology = Topology::from_routers(&[
            router("hc-1", &[("10.1.0.1", "10.1.0.2"), ("10.2.0.1", "10.2.0.2")]),
            router("hc-2", &[("10.1.0.2", "10.1.0.1"), ("10.2.0.2", "10.2.0.1")]),
        ]);
        assert_eq!(topology.backup_of("10.1.0.1"), Some("10.1.0.2"));
        assert_eq!(topology.owner_of("10.2.0.2"), Some("hc-2"));
        assert!(topology.is_owned("10.2.0.1"));
        assert!(!topology.is_owned("10.9.9.9"));
        assert_eq!(topology.owned().count(), 4);
    }

    #[test]
    fn test_interfaces_without_pair_are_ignored() {
        let mut r = router("hc-1", &[]);
        r.interfaces.push(InterfaceConfig {
            index: Some(0),
            security_group_ids: vec!["sg".into()],
            ..Default::default()
        });
        assert!(Topology::from_routers(&[r]).is_empty());
    }
}
