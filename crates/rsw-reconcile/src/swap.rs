//! Security-group swap policy for an active/passive router pair.
//!
//! Each member of the pair owns a native security profile (interface index ->
//! security groups). When the primary fails, the two members exchange
//! profiles so that the surviving router carries the primary's posture.

use std::collections::{BTreeMap, BTreeSet};

use rsw_core::{ConfigError, FailbackPolicy, RouterConfig};
use serde::Serialize;

use crate::health::HealthView;

/// interface index -> security group ids
pub type SecurityProfile = BTreeMap<u32, BTreeSet<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapMember {
    /// Healthcheck address of the router.
    pub router: String,
    pub vm_id: String,
    pub native: SecurityProfile,
    pub last_operations: BTreeMap<u32, String>,
}

impl SwapMember {
    fn from_router(router: &RouterConfig, vm_id: &str) -> Self {
        let last_operations = router
            .interfaces
            .iter()
            .filter_map(|iface| {
                let index = iface.index?;
                router
                    .last_operation_id(index)
                    .map(|op| (index, op.to_string()))
            })
            .collect();
        Self {
            router: router.healthcheck_address.clone(),
            vm_id: vm_id.to_string(),
            native: router.native_profile(),
            last_operations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPair {
    pub primary: SwapMember,
    pub backup: SwapMember,
}

impl SwapPair {
    pub fn profile(&self, profile: Profile) -> &SecurityProfile {
        match profile {
            Profile::PrimaryNative => &self.primary.native,
            Profile::BackupNative => &self.backup.native,
        }
    }

    pub fn members(&self) -> [&SwapMember; 2] {
        [&self.primary, &self.backup]
    }
}

/// Extract the swap pair from the router list.
///
/// `Ok(None)` when no router carries a `vm_id` (swap not configured);
/// `InvalidTopology` unless exactly two do and exactly one of them is primary.
pub fn swap_pair(routers: &[RouterConfig]) -> Result<Option<SwapPair>, ConfigError> {
    let vm_routers: Vec<(&RouterConfig, &str)> = routers
        .iter()
        .filter_map(|router| router.vm_id().map(|vm| (router, vm)))
        .collect();
    if vm_routers.is_empty() {
        return Ok(None);
    }

    let primaries = vm_routers.iter().filter(|(router, _)| router.primary).count();
    let invalid = ConfigError::InvalidTopology {
        vm_routers: vm_routers.len(),
        primaries,
    };
    let [first, second] = vm_routers.as_slice() else {
        return Err(invalid);
    };
    let (primary, backup) = match (first.0.primary, second.0.primary) {
        (true, false) => (first, second),
        (false, true) => (second, first),
        _ => return Err(invalid),
    };

    Ok(Some(SwapPair {
        primary: SwapMember::from_router(primary.0, primary.1),
        backup: SwapMember::from_router(backup.0, backup.1),
    }))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Profile {
    PrimaryNative,
    BackupNative,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SwapIntent {
    Assign { primary: Profile, backup: Profile },
    /// Both members are down; there is no healthy posture to copy from.
    Unresolved,
}

const NATIVE: SwapIntent = SwapIntent::Assign {
    primary: Profile::PrimaryNative,
    backup: Profile::BackupNative,
};

const SWAPPED: SwapIntent = SwapIntent::Assign {
    primary: Profile::BackupNative,
    backup: Profile::PrimaryNative,
};

/// Pick the profile each member should carry.
///
/// `currently_swapped` only matters for the sticky policy with both members
/// healthy, where an existing swap is kept rather than reverted.
pub fn select_profiles(
    primary_healthy: bool,
    backup_healthy: bool,
    policy: FailbackPolicy,
    currently_swapped: bool,
) -> SwapIntent {
    match (primary_healthy, backup_healthy) {
        (false, true) => SWAPPED,
        (true, false) => NATIVE,
        (false, false) => SwapIntent::Unresolved,
        (true, true) => match policy {
            FailbackPolicy::BackToPrimary => NATIVE,
            FailbackPolicy::Sticky if currently_swapped => SWAPPED,
            FailbackPolicy::Sticky => NATIVE,
        },
    }
}

/// Whether the backup currently carries the primary's native profile.
pub fn is_swapped(pair: &SwapPair, live_backup: &SecurityProfile) -> bool {
    !pair.primary.native.is_empty()
        && pair
            .primary
            .native
            .iter()
            .all(|(index, groups)| live_backup.get(index) == Some(groups))
}

/// A security-group replacement for one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceUpdate {
    pub router: String,
    pub vm_id: String,
    pub index: u32,
    pub security_group_ids: BTreeSet<String>,
    /// Handle of the last mutation issued for this interface; the dispatcher
    /// refuses to issue another while it is still running.
    pub last_operation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceIssue {
    /// The profile names an interface index the VM does not have.
    MissingLiveInterface { router: String, index: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPlan {
    pub intent: SwapIntent,
    pub updates: Vec<InterfaceUpdate>,
    pub issues: Vec<InterfaceIssue>,
}

/// Compare live security groups of both members with the intended profiles
/// and emit an update only where they differ.
pub fn plan_swap(
    pair: &SwapPair,
    view: &HealthView,
    policy: FailbackPolicy,
    live_primary: &SecurityProfile,
    live_backup: &SecurityProfile,
) -> SwapPlan {
    let intent = select_profiles(
        view.router_healthy(&pair.primary.router),
        view.router_healthy(&pair.backup.router),
        policy,
        is_swapped(pair, live_backup),
    );

    let mut plan = SwapPlan {
        intent,
        updates: Vec::new(),
        issues: Vec::new(),
    };
    if let SwapIntent::Assign { primary, backup } = intent {
        plan_member(&pair.primary, pair.profile(primary), live_primary, &mut plan);
        plan_member(&pair.backup, pair.profile(backup), live_backup, &mut plan);
    }
    plan
}

fn plan_member(
    target: &SwapMember,
    intended: &SecurityProfile,
    live: &SecurityProfile,
    plan: &mut SwapPlan,
) {
    for (index, groups) in intended {
        match live.get(index) {
            None => plan.issues.push(InterfaceIssue::MissingLiveInterface {
                router: target.router.clone(),
                index: *index,
            }),
            Some(current) if current == groups => {}
            Some(_) => plan.updates.push(InterfaceUpdate {
                router: target.router.clone(),
                vm_id: target.vm_id.clone(),
                index: *index,
                security_group_ids: groups.clone(),
                last_operation_id: target.last_operations.get(index).cloned(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "swap_tests.rs"]
mod tests;
