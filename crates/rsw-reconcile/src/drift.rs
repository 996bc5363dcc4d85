//! Drift reconciliation between the persisted `routes` map of a route table
//! and what the network reports for it right now.

use std::collections::{BTreeMap, BTreeSet};

use rsw_core::{DriftError, ObservedRouteTable, Topology};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftOutcome {
    pub routes: BTreeMap<String, String>,
    pub inserted: Vec<String>,
    pub removed: Vec<String>,
}

impl DriftOutcome {
    pub fn changed(&self) -> bool {
        !self.inserted.is_empty() || !self.removed.is_empty()
    }
}

/// Merge an observed route table into the persisted prefix -> primary map.
///
/// A managed prefix (next hop owned by a configured router) seen for the first
/// time is recorded with its current next hop as the primary baseline. A
/// persisted prefix that is no longer managed in the observed table is
/// dropped. A recorded primary is never rewritten in place.
pub fn reconcile_routes(
    persisted: &BTreeMap<String, String>,
    observed: &ObservedRouteTable,
    topology: &Topology,
) -> Result<DriftOutcome, DriftError> {
    if observed.static_routes.is_empty() {
        return Err(DriftError::EmptyTable {
            table: observed.id.clone(),
        });
    }

    let mut routes = persisted.clone();
    let mut inserted = Vec::new();
    let mut managed = BTreeSet::new();

    for (prefix, next_hop) in observed.next_hops() {
        if !topology.is_owned(next_hop) {
            continue;
        }
        managed.insert(prefix);
        if !routes.contains_key(prefix) {
            routes.insert(prefix.to_string(), next_hop.to_string());
            inserted.push(prefix.to_string());
        }
    }

    let removed: Vec<String> = routes
        .keys()
        .filter(|prefix| !managed.contains(prefix.as_str()))
        .cloned()
        .collect();
    for prefix in &removed {
        routes.remove(prefix);
    }

    Ok(DriftOutcome {
        routes,
        inserted,
        removed,
    })
}
