//! Health evaluation: raw load-balancer snapshot -> healthy/unhealthy sets.

use std::collections::BTreeSet;

use rsw_core::{HealthError, HealthSnapshot, Topology};

/// Partition of routers, and of the next hops they own, by health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthView {
    pub healthy_routers: BTreeSet<String>,
    pub unhealthy_routers: BTreeSet<String>,
    pub healthy_nexthops: BTreeSet<String>,
    pub unhealthy_nexthops: BTreeSet<String>,
}

impl HealthView {
    pub fn router_healthy(&self, router: &str) -> bool {
        self.healthy_routers.contains(router)
    }

    pub fn nexthop_healthy(&self, next_hop: &str) -> bool {
        self.healthy_nexthops.contains(next_hop)
    }

    pub fn nexthop_unhealthy(&self, next_hop: &str) -> bool {
        self.unhealthy_nexthops.contains(next_hop)
    }
}

/// Evaluate a health snapshot against the nexthop topology.
///
/// Fails with `InsufficientTargets` below two targets and with `AllUnhealthy`
/// when no target reports healthy; routing state must never be mutated
/// without at least one corroborating healthy signal. Anything other than
/// `Healthy` counts as unhealthy. A next hop whose owner is missing from the
/// snapshot is unhealthy.
pub fn evaluate(snapshot: &HealthSnapshot, topology: &Topology) -> Result<HealthView, HealthError> {
    if snapshot.len() < 2 {
        return Err(HealthError::InsufficientTargets {
            found: snapshot.len(),
        });
    }

    let mut view = HealthView::default();
    for (address, status) in snapshot {
        if status.is_healthy() {
            view.healthy_routers.insert(address.clone());
        } else {
            view.unhealthy_routers.insert(address.clone());
        }
    }

    if view.healthy_routers.is_empty() {
        return Err(HealthError::AllUnhealthy {
            addresses: snapshot.keys().cloned().collect(),
        });
    }

    for (next_hop, owner) in topology.owned() {
        if view.router_healthy(owner) {
            view.healthy_nexthops.insert(next_hop.to_string());
        } else {
            view.unhealthy_nexthops.insert(next_hop.to_string());
        }
    }

    Ok(view)
}
