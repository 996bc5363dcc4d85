//! Failover decision logic for routed prefixes.

use rsw_core::{FailbackPolicy, ObservedRouteTable, RouteTableConfig, StaticRoute, Topology};
use serde::Serialize;
use tracing::{info, warn};

use crate::health::HealthView;

/// What to do with one prefix's next hop this pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NextHopDecision {
    /// Current next hop stays.
    Keep,
    /// Current next hop is unhealthy and its backup is healthy.
    Failover { to: String },
    /// Current next hop is healthy but the recorded primary is healthy again
    /// and the policy asks to return to it.
    BackToPrimary { to: String },
    /// Current next hop is unhealthy and so is its backup; nothing to move to.
    BackupAlsoUnhealthy { backup: String },
    /// Next hop is not owned by any configured router.
    Unmanaged,
}

/// Decide the next hop of one prefix.
///
/// `current`: next hop active in the network right now.
/// `recorded_primary`: primary baseline persisted for the prefix, if any.
///
/// With an unchanged health partition and an unchanged `current`, a second
/// call after applying the first decision always yields `Keep`.
pub fn decide_next_hop(
    current: &str,
    recorded_primary: Option<&str>,
    view: &HealthView,
    topology: &Topology,
    policy: FailbackPolicy,
) -> NextHopDecision {
    if !topology.is_owned(current) {
        return NextHopDecision::Unmanaged;
    }

    if view.nexthop_unhealthy(current) {
        return match topology.backup_of(current) {
            Some(backup) if view.nexthop_healthy(backup) => NextHopDecision::Failover {
                to: backup.to_string(),
            },
            Some(backup) => NextHopDecision::BackupAlsoUnhealthy {
                backup: backup.to_string(),
            },
            None => NextHopDecision::Unmanaged,
        };
    }

    match recorded_primary {
        Some(primary)
            if policy.is_back_to_primary()
                && primary != current
                && view.nexthop_healthy(primary) =>
        {
            NextHopDecision::BackToPrimary {
                to: primary.to_string(),
            }
        }
        _ => NextHopDecision::Keep,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Failover,
    BackToPrimary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixChange {
    pub prefix: String,
    pub from: String,
    pub to: String,
    pub kind: ChangeKind,
}

/// Whole-list replacement for one route table.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteTableMutation {
    pub table_id: String,
    pub table_name: String,
    /// Every route of the table, sorted by prefix, with the new next hops.
    pub static_routes: Vec<StaticRoute>,
    pub changes: Vec<PrefixChange>,
}

/// A prefix stuck on an unhealthy next hop because its backup is down too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedPrefix {
    pub prefix: String,
    pub current: String,
    pub backup: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TablePlan {
    pub table_id: String,
    pub table_name: String,
    pub mutation: Option<RouteTableMutation>,
    pub blocked: Vec<BlockedPrefix>,
}

/// Run the decision for every route of an observed table.
pub fn plan_table(
    config: &RouteTableConfig,
    observed: &ObservedRouteTable,
    view: &HealthView,
    topology: &Topology,
    policy: FailbackPolicy,
) -> TablePlan {
    let mut static_routes = observed.static_routes.clone();
    static_routes.sort_by(|a, b| a.destination_prefix.cmp(&b.destination_prefix));

    let mut changes = Vec::new();
    let mut blocked = Vec::new();

    for route in &mut static_routes {
        let Some(current) = route.next_hop_address.clone() else {
            continue;
        };
        let prefix = route.destination_prefix.clone();
        let recorded = config.routes.get(&prefix).map(String::as_str);

        let (to, kind) = match decide_next_hop(&current, recorded, view, topology, policy) {
            NextHopDecision::Failover { to } => (to, ChangeKind::Failover),
            NextHopDecision::BackToPrimary { to } => (to, ChangeKind::BackToPrimary),
            NextHopDecision::BackupAlsoUnhealthy { backup } => {
                warn!(
                    table = %observed.id,
                    prefix = %prefix,
                    current = %current,
                    backup = %backup,
                    "Backup next hop is not healthy, cannot switch"
                );
                blocked.push(BlockedPrefix {
                    prefix,
                    current,
                    backup,
                });
                continue;
            }
            NextHopDecision::Keep | NextHopDecision::Unmanaged => continue,
        };

        info!(
            table = %observed.id,
            prefix = %prefix,
            from = %current,
            to = %to,
            ?kind,
            "Next hop change planned"
        );
        route.next_hop_address = Some(to.clone());
        changes.push(PrefixChange {
            prefix,
            from: current,
            to,
            kind,
        });
    }

    let mutation = (!changes.is_empty()).then(|| RouteTableMutation {
        table_id: observed.id.clone(),
        table_name: observed.name.clone(),
        static_routes,
        changes,
    });

    TablePlan {
        table_id: observed.id.clone(),
        table_name: observed.name.clone(),
        mutation,
        blocked,
    }
}

#[cfg(test)]
#[path = "decision_tests.rs"]
mod tests;
