//! Two-router fixture shared by the pass and cycle tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rsw_cloud::InMemoryCloud;
use rsw_config::Settings;
use rsw_core::{
    Document, FailbackPolicy, InterfaceConfig, ObservedRouteTable, RouteTableConfig, RouterConfig,
    StaticRoute, TargetStatus,
};

use crate::pass::PassContext;

pub const R1_HC: &str = "192.168.0.10";
pub const R2_HC: &str = "192.168.0.20";
pub const R1: &str = "192.168.1.10";
pub const R2: &str = "192.168.1.20";
pub const PREFIX: &str = "10.0.0.0/8";
pub const FOREIGN_PREFIX: &str = "172.16.0.0/12";
pub const FOREIGN_HOP: &str = "10.99.0.1";

pub fn groups(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|id| (*id).to_string()).collect()
}

fn router(hc: &str, vm: &str, primary: bool, own: &str, backup: &str, sg: &str) -> RouterConfig {
    RouterConfig {
        healthcheck_address: hc.into(),
        vm_id: Some(vm.into()),
        primary,
        interfaces: vec![
            InterfaceConfig {
                index: Some(0),
                own_ip: Some(own.into()),
                backup_peer_ip: Some(backup.into()),
                security_group_ids: vec![format!("{sg}0")],
                last_operation_id: None,
            },
            InterfaceConfig {
                index: Some(1),
                security_group_ids: vec![format!("{sg}1")],
                ..Default::default()
            },
        ],
    }
}

pub fn document() -> Document {
    Document {
        load_balancer_id: "lb-1".into(),
        target_group_id: "tg-1".into(),
        updating_tables: false,
        route_tables: vec![RouteTableConfig {
            id: "rt-1".into(),
            name: Some("main".into()),
            routes: BTreeMap::from([(PREFIX.to_string(), R1.to_string())]),
        }],
        routers: vec![
            router(R1_HC, "vm-1", true, R1, R2, "sg-p"),
            router(R2_HC, "vm-2", false, R2, R1, "sg-b"),
        ],
    }
}

pub fn observed(id: &str, current: &str) -> ObservedRouteTable {
    ObservedRouteTable {
        id: id.into(),
        name: "main".into(),
        static_routes: vec![
            StaticRoute::via(PREFIX, current),
            StaticRoute::via(FOREIGN_PREFIX, FOREIGN_HOP),
        ],
    }
}

pub fn status(healthy: bool) -> TargetStatus {
    if healthy {
        TargetStatus::Healthy
    } else {
        TargetStatus::Unhealthy
    }
}

pub struct World {
    pub cloud: Arc<InMemoryCloud>,
    pub ctx: PassContext,
}

impl World {
    /// Routers with native security groups, `rt-1` routing `PREFIX` via
    /// `current`.
    pub fn new(policy: FailbackPolicy, current: &str, r1_healthy: bool, r2_healthy: bool) -> Self {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.set_document(document());
        cloud.set_health(&[(R1_HC, status(r1_healthy)), (R2_HC, status(r2_healthy))]);
        cloud.set_table(observed("rt-1", current));
        cloud.set_interfaces(
            "vm-1",
            BTreeMap::from([(0, groups(&["sg-p0"])), (1, groups(&["sg-p1"]))]),
        );
        cloud.set_interfaces(
            "vm-2",
            BTreeMap::from([(0, groups(&["sg-b0"])), (1, groups(&["sg-b1"]))]),
        );

        let settings = Settings {
            back_to_primary: policy.is_back_to_primary(),
            folder_name: "net".into(),
            ..Settings::default()
        };
        let ctx = PassContext::new(cloud.clone(), cloud.clone(), &settings);
        Self { cloud, ctx }
    }

    pub fn edit_document(&self, edit: impl FnOnce(&mut Document)) {
        let mut document = self.cloud.document().unwrap_or_default();
        edit(&mut document);
        self.cloud.set_document(document);
    }

    pub fn stored(&self) -> Document {
        self.cloud.document().unwrap_or_default()
    }

    pub fn metric_values(&self, name: &str) -> Vec<i64> {
        self.cloud
            .metrics()
            .iter()
            .filter(|event| event.name == name)
            .map(|event| event.value)
            .collect()
    }
}
