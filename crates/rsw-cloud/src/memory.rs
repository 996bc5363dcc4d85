//! In-memory implementation of every collaborator trait.
//!
//! Mutations are applied to the in-memory world immediately and answered with
//! sequential `op-N` handles, so a follow-up pass observes the new state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use rsw_core::{
    Document, HealthSnapshot, LiveInterface, MetricEvent, ObservedRouteTable, StaticRoute,
    TargetStatus,
};

use crate::{
    ComputeApi, DocumentStore, HealthSource, MetricsSink, OperationApi, OperationStatus,
    RouteTableApi,
};

/// Call sites where a failure can be injected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Fault {
    Get,
    Put,
    Health,
    ReadTable(String),
    WriteTable(String),
    ReadInterfaces(String),
    UpdateInterface(String, u32),
    OperationStatus(String),
    Metrics,
}

#[derive(Debug, Default)]
struct State {
    document: Option<Document>,
    puts: Vec<Document>,
    health: HealthSnapshot,
    tables: BTreeMap<String, ObservedRouteTable>,
    table_writes: Vec<(String, Vec<StaticRoute>)>,
    interfaces: BTreeMap<String, BTreeMap<u32, BTreeSet<String>>>,
    interface_updates: Vec<(String, u32, BTreeSet<String>)>,
    operations: BTreeMap<String, OperationStatus>,
    next_operation: u64,
    hold_operations: bool,
    metrics: Vec<MetricEvent>,
    faults: BTreeSet<Fault>,
}

impl State {
    fn check(&self, fault: Fault) -> Result<()> {
        if self.faults.contains(&fault) {
            bail!("injected failure: {fault:?}");
        }
        Ok(())
    }

    fn start_operation(&mut self) -> String {
        self.next_operation += 1;
        let id = format!("op-{}", self.next_operation);
        self.operations.insert(
            id.clone(),
            OperationStatus {
                done: !self.hold_operations,
                error: None,
            },
        );
        id
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCloud {
    state: Mutex<State>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("in-memory cloud state lock poisoned"))
    }

    fn read<T: Default>(&self, f: impl FnOnce(&State) -> T) -> T {
        self.state.lock().map(|state| f(&state)).unwrap_or_default()
    }

    fn write(&self, f: impl FnOnce(&mut State)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }

    pub fn set_document(&self, document: Document) {
        self.write(|state| state.document = Some(document));
    }

    pub fn set_health(&self, targets: &[(&str, TargetStatus)]) {
        self.write(|state| {
            state.health = targets
                .iter()
                .map(|(address, status)| ((*address).to_string(), status.clone()))
                .collect();
        });
    }

    pub fn set_table(&self, table: ObservedRouteTable) {
        self.write(|state| {
            state.tables.insert(table.id.clone(), table);
        });
    }

    pub fn set_interfaces(&self, vm_id: &str, profile: BTreeMap<u32, BTreeSet<String>>) {
        self.write(|state| {
            state.interfaces.insert(vm_id.to_string(), profile);
        });
    }

    pub fn set_operation(&self, operation_id: &str, status: OperationStatus) {
        self.write(|state| {
            state.operations.insert(operation_id.to_string(), status);
        });
    }

    /// New operations stay `done: false` until [`Self::complete_operations`].
    pub fn hold_operations(&self, hold: bool) {
        self.write(|state| state.hold_operations = hold);
    }

    pub fn complete_operations(&self) {
        self.write(|state| {
            for status in state.operations.values_mut() {
                status.done = true;
            }
        });
    }

    pub fn fail(&self, fault: Fault) {
        self.write(|state| {
            state.faults.insert(fault);
        });
    }

    pub fn heal(&self, fault: &Fault) {
        self.write(|state| {
            state.faults.remove(fault);
        });
    }

    pub fn document(&self) -> Option<Document> {
        self.read(|state| state.document.clone())
    }

    /// Every document written, in order.
    pub fn puts(&self) -> Vec<Document> {
        self.read(|state| state.puts.clone())
    }

    pub fn table(&self, table_id: &str) -> Option<ObservedRouteTable> {
        self.read(|state| state.tables.get(table_id).cloned())
    }

    pub fn table_writes(&self) -> Vec<(String, Vec<StaticRoute>)> {
        self.read(|state| state.table_writes.clone())
    }

    pub fn interfaces(&self, vm_id: &str) -> BTreeMap<u32, BTreeSet<String>> {
        self.read(|state| state.interfaces.get(vm_id).cloned().unwrap_or_default())
    }

    pub fn interface_updates(&self) -> Vec<(String, u32, BTreeSet<String>)> {
        self.read(|state| state.interface_updates.clone())
    }

    pub fn metrics(&self) -> Vec<MetricEvent> {
        self.read(|state| state.metrics.clone())
    }
}

#[async_trait]
impl DocumentStore for InMemoryCloud {
    async fn get(&self) -> Result<Option<Document>> {
        let state = self.state()?;
        state.check(Fault::Get)?;
        Ok(state.document.clone())
    }

    async fn put(&self, document: &Document) -> Result<()> {
        let mut state = self.state()?;
        state.check(Fault::Put)?;
        state.document = Some(document.clone());
        state.puts.push(document.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[async_trait]
impl HealthSource for InMemoryCloud {
    async fn target_health(&self, _: &str, _: &str) -> Result<HealthSnapshot> {
        let state = self.state()?;
        state.check(Fault::Health)?;
        Ok(state.health.clone())
    }
}

#[async_trait]
impl RouteTableApi for InMemoryCloud {
    async fn read_table(&self, table_id: &str) -> Result<ObservedRouteTable> {
        let state = self.state()?;
        state.check(Fault::ReadTable(table_id.to_string()))?;
        state
            .tables
            .get(table_id)
            .cloned()
            .ok_or_else(|| anyhow!("route table {table_id} not found"))
    }

    async fn write_table(&self, table_id: &str, routes: &[StaticRoute]) -> Result<String> {
        let mut state = self.state()?;
        state.check(Fault::WriteTable(table_id.to_string()))?;
        let table = state
            .tables
            .get_mut(table_id)
            .ok_or_else(|| anyhow!("route table {table_id} not found"))?;
        table.static_routes = routes.to_vec();
        state
            .table_writes
            .push((table_id.to_string(), routes.to_vec()));
        Ok(state.start_operation())
    }
}

#[async_trait]
impl ComputeApi for InMemoryCloud {
    async fn read_interfaces(&self, vm_id: &str) -> Result<Vec<LiveInterface>> {
        let state = self.state()?;
        state.check(Fault::ReadInterfaces(vm_id.to_string()))?;
        let profile = state
            .interfaces
            .get(vm_id)
            .ok_or_else(|| anyhow!("instance {vm_id} not found"))?;
        Ok(profile
            .iter()
            .map(|(index, groups)| LiveInterface {
                index: *index,
                security_group_ids: groups.clone(),
            })
            .collect())
    }

    async fn update_interface(
        &self,
        vm_id: &str,
        index: u32,
        security_group_ids: &BTreeSet<String>,
    ) -> Result<String> {
        let mut state = self.state()?;
        state.check(Fault::UpdateInterface(vm_id.to_string(), index))?;
        let slot = state
            .interfaces
            .get_mut(vm_id)
            .and_then(|profile| profile.get_mut(&index))
            .ok_or_else(|| anyhow!("instance {vm_id} has no interface {index}"))?;
        *slot = security_group_ids.clone();
        state
            .interface_updates
            .push((vm_id.to_string(), index, security_group_ids.clone()));
        Ok(state.start_operation())
    }
}

#[async_trait]
impl OperationApi for InMemoryCloud {
    async fn operation_status(&self, operation_id: &str) -> Result<Option<OperationStatus>> {
        let state = self.state()?;
        state.check(Fault::OperationStatus(operation_id.to_string()))?;
        Ok(state.operations.get(operation_id).cloned())
    }
}

#[async_trait]
impl MetricsSink for InMemoryCloud {
    async fn write_metrics(&self, events: &[MetricEvent]) -> Result<()> {
        let mut state = self.state()?;
        state.check(Fault::Metrics)?;
        state.metrics.extend_from_slice(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ObservedRouteTable {
        ObservedRouteTable {
            id: "rt-1".into(),
            name: "main".into(),
            static_routes: vec![StaticRoute::via("10.0.0.0/8", "192.168.1.10")],
        }
    }

    #[tokio::test]
    async fn test_write_table_applies_and_returns_done_operation() {
        let cloud = InMemoryCloud::new();
        cloud.set_table(table());

        let routes = vec![StaticRoute::via("10.0.0.0/8", "192.168.1.20")];
        let op = cloud.write_table("rt-1", &routes).await.unwrap();

        assert_eq!(op, "op-1");
        assert_eq!(cloud.read_table("rt-1").await.unwrap().static_routes, routes);
        assert!(cloud.operation_status(&op).await.unwrap().unwrap().done);
    }

    #[tokio::test]
    async fn test_held_operations_stay_running() {
        let cloud = InMemoryCloud::new();
        cloud.set_interfaces("vm-1", BTreeMap::from([(0, BTreeSet::new())]));
        cloud.hold_operations(true);

        let groups = BTreeSet::from(["sg-1".to_string()]);
        let op = cloud.update_interface("vm-1", 0, &groups).await.unwrap();
        assert!(!cloud.operation_status(&op).await.unwrap().unwrap().done);

        cloud.complete_operations();
        assert!(cloud.operation_status(&op).await.unwrap().unwrap().done);
        assert_eq!(cloud.interfaces("vm-1")[&0], groups);
    }

    #[tokio::test]
    async fn test_injected_fault_fails_only_its_call_site() {
        let cloud = InMemoryCloud::new();
        cloud.set_table(table());
        cloud.fail(Fault::WriteTable("rt-1".into()));

        assert!(cloud.read_table("rt-1").await.is_ok());
        assert!(cloud.write_table("rt-1", &[]).await.is_err());

        cloud.heal(&Fault::WriteTable("rt-1".into()));
        assert!(cloud.write_table("rt-1", &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_interface_index_is_rejected() {
        let cloud = InMemoryCloud::new();
        cloud.set_interfaces("vm-1", BTreeMap::new());
        let err = cloud
            .update_interface("vm-1", 3, &BTreeSet::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no interface 3"));
    }
}
