//! The persisted intent document: route tables, router topology and the
//! document-wide `updating_tables` flag.
//!
//! The document is read at the start of every pass and written back as a
//! whole (last writer wins). Field names follow the layout produced by the
//! infrastructure tooling that seeds the document.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Whether traffic and security posture return to the nominal primary once it
/// recovers, or stay on whichever member is currently active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailbackPolicy {
    #[default]
    BackToPrimary,
    Sticky,
}

impl FailbackPolicy {
    pub fn from_back_to_primary(enabled: bool) -> Self {
        if enabled {
            Self::BackToPrimary
        } else {
            Self::Sticky
        }
    }

    pub fn is_back_to_primary(self) -> bool {
        matches!(self, Self::BackToPrimary)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "loadBalancerId", default)]
    pub load_balancer_id: String,

    #[serde(rename = "targetGroupId", default)]
    pub target_group_id: String,

    /// Advisory "a route mutation is in flight" marker. Not a lock.
    #[serde(default)]
    pub updating_tables: bool,

    #[serde(default)]
    pub route_tables: Vec<RouteTableConfig>,

    #[serde(default)]
    pub routers: Vec<RouterConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTableConfig {
    #[serde(rename = "route_table_id")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// destination prefix -> recorded primary next hop (first seen wins)
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(rename = "healthchecked_ip", default)]
    pub healthcheck_address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_id: Option<String>,

    #[serde(default)]
    pub primary: bool,

    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub own_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_peer_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_group_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operation_id: Option<String>,
}

impl InterfaceConfig {
    /// `(own_ip, backup_peer_ip)` when both are set.
    pub fn nexthop_pair(&self) -> Option<(&str, &str)> {
        match (non_empty(&self.own_ip), non_empty(&self.backup_peer_ip)) {
            (Some(own), Some(backup)) => Some((own, backup)),
            _ => None,
        }
    }

    /// `(index, security groups)` when the interface takes part in the swap.
    pub fn security_profile(&self) -> Option<(u32, BTreeSet<String>)> {
        match self.index {
            Some(index) if !self.security_group_ids.is_empty() => {
                Some((index, self.security_group_ids.iter().cloned().collect()))
            }
            _ => None,
        }
    }
}

impl RouterConfig {
    pub fn vm_id(&self) -> Option<&str> {
        non_empty(&self.vm_id)
    }

    /// Native security profile keyed by interface index.
    pub fn native_profile(&self) -> BTreeMap<u32, BTreeSet<String>> {
        self.interfaces
            .iter()
            .filter_map(InterfaceConfig::security_profile)
            .collect()
    }

    pub fn last_operation_id(&self, index: u32) -> Option<&str> {
        self.interfaces
            .iter()
            .find(|iface| iface.index == Some(index))
            .and_then(|iface| non_empty(&iface.last_operation_id))
    }

    /// Record the handle of a freshly issued interface mutation.
    /// Returns false when no interface carries `index`.
    pub fn record_operation(&mut self, index: u32, operation_id: &str) -> bool {
        match self
            .interfaces
            .iter_mut()
            .find(|iface| iface.index == Some(index))
        {
            Some(iface) => {
                iface.last_operation_id = Some(operation_id.to_string());
                true
            }
            None => false,
        }
    }
}

impl Document {
    /// Check the document shape once at load time.
    ///
    /// Every problem found is returned so callers can report all of them;
    /// an empty vector means the document is usable.
    pub fn validation_errors(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.routers.is_empty() {
            errors.push(ConfigError::NoRouters);
        }
        if self.route_tables.is_empty() {
            errors.push(ConfigError::NoRouteTables);
        }

        for (position, router) in self.routers.iter().enumerate() {
            validate_router(position, router, &mut errors);
        }

        let vm_routers: Vec<&RouterConfig> = self
            .routers
            .iter()
            .filter(|router| router.vm_id().is_some())
            .collect();
        if !vm_routers.is_empty() {
            let primaries = vm_routers.iter().filter(|router| router.primary).count();
            if vm_routers.len() != 2 || primaries != 1 {
                errors.push(ConfigError::InvalidTopology {
                    vm_routers: vm_routers.len(),
                    primaries,
                });
            }
        }

        errors
    }

    pub fn router_mut_by_vm(&mut self, vm_id: &str) -> Option<&mut RouterConfig> {
        self.routers
            .iter_mut()
            .find(|router| router.vm_id() == Some(vm_id))
    }
}

fn validate_router(position: usize, router: &RouterConfig, errors: &mut Vec<ConfigError>) {
    if router.healthcheck_address.trim().is_empty() {
        errors.push(ConfigError::MissingHealthcheckAddress { position });
        return;
    }
    let name = &router.healthcheck_address;

    if router.interfaces.is_empty() {
        errors.push(ConfigError::NoInterfaces {
            router: name.clone(),
        });
        return;
    }

    let mut has_security_profile = false;
    for iface in &router.interfaces {
        match (non_empty(&iface.own_ip), non_empty(&iface.backup_peer_ip)) {
            (Some(_), None) => errors.push(ConfigError::IncompleteInterface {
                router: name.clone(),
                present: "own_ip",
                missing: "backup_peer_ip",
            }),
            (None, Some(_)) => errors.push(ConfigError::IncompleteInterface {
                router: name.clone(),
                present: "backup_peer_ip",
                missing: "own_ip",
            }),
            _ => {}
        }

        match (iface.index, iface.security_group_ids.is_empty()) {
            (Some(_), true) => errors.push(ConfigError::IncompleteInterface {
                router: name.clone(),
                present: "index",
                missing: "security_group_ids",
            }),
            (None, false) => errors.push(ConfigError::IncompleteInterface {
                router: name.clone(),
                present: "security_group_ids",
                missing: "index",
            }),
            (Some(_), false) => has_security_profile = true,
            (None, true) => {}
        }
    }

    match (router.vm_id(), has_security_profile) {
        (None, true) => errors.push(ConfigError::MissingVmId {
            router: name.clone(),
        }),
        (Some(_), false) => errors.push(ConfigError::VmWithoutSecurityGroups {
            router: name.clone(),
        }),
        _ => {}
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;
