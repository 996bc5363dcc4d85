//! External collaborators of a reconciliation pass: the document store, the
//! load-balancer health source, the route-table / compute / operation APIs and
//! the metrics sink.
//!
//! Each collaborator is a trait so passes can run against the REST client in
//! production and against [`memory::InMemoryCloud`] in tests.

pub mod memory;
pub mod rest;
pub mod store;

use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use rsw_core::{Document, HealthSnapshot, LiveInterface, MetricEvent, ObservedRouteTable, StaticRoute};

pub use memory::{Fault, InMemoryCloud};
pub use rest::CloudClient;
pub use store::YamlFileStore;

/// Whole-document storage for the persisted intent.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `Ok(None)` when no document exists yet.
    async fn get(&self) -> Result<Option<Document>>;
    /// Replace the stored document (last writer wins).
    async fn put(&self, document: &Document) -> Result<()>;
    /// Human-readable location, used in logs and errors.
    fn location(&self) -> String;
}

#[async_trait]
pub trait HealthSource: Send + Sync {
    async fn target_health(
        &self,
        load_balancer_id: &str,
        target_group_id: &str,
    ) -> Result<HealthSnapshot>;
}

#[async_trait]
pub trait RouteTableApi: Send + Sync {
    async fn read_table(&self, table_id: &str) -> Result<ObservedRouteTable>;
    /// Replace the static-route list of a table; returns the operation id.
    async fn write_table(&self, table_id: &str, routes: &[StaticRoute]) -> Result<String>;
}

#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn read_interfaces(&self, vm_id: &str) -> Result<Vec<LiveInterface>>;
    /// Replace the security groups of one interface; returns the operation id.
    async fn update_interface(
        &self,
        vm_id: &str,
        index: u32,
        security_group_ids: &BTreeSet<String>,
    ) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    pub done: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait OperationApi: Send + Sync {
    /// `Ok(None)` when the API no longer knows the operation.
    async fn operation_status(&self, operation_id: &str) -> Result<Option<OperationStatus>>;
}

/// Fire-and-forget sink; callers log failures and never retry within a pass.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn write_metrics(&self, events: &[MetricEvent]) -> Result<()>;
}
