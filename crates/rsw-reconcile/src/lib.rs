//! Reconciliation core: health evaluation, drift reconciliation, next-hop
//! failover decisions and the security-group swap policy.
//!
//! Everything here is pure; fetching and mutating happens in `rsw-scheduler`.

pub mod decision;
pub mod drift;
pub mod health;
pub mod swap;

pub use decision::{
    BlockedPrefix, ChangeKind, NextHopDecision, PrefixChange, RouteTableMutation, TablePlan,
    decide_next_hop, plan_table,
};
pub use drift::{DriftOutcome, reconcile_routes};
pub use health::{HealthView, evaluate};
pub use swap::{
    InterfaceIssue, InterfaceUpdate, Profile, SecurityProfile, SwapIntent, SwapMember, SwapPair,
    SwapPlan, is_swapped, plan_swap, select_profiles, swap_pair,
};
