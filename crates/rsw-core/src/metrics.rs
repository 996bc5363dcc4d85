//! Observability events emitted by a pass.
//!
//! Events are collected into a [`MetricsBatch`] and flushed once, at the end
//! of the pass (or when the pass aborts on an all-unhealthy snapshot).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const ROUTER_STATE: &str = "route_switcher.router_state";
pub const TABLE_CHANGED: &str = "route_switcher.table_changed";
pub const SWITCHOVER: &str = "route_switcher.switchover";
pub const SECURITY_GROUPS_CHANGED: &str = "route_switcher.security_groups_changed";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MetricKind {
    #[serde(rename = "IGAUGE")]
    IntGauge,
}

/// Outcome value carried by the `*_changed` gauges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeStatus {
    Unchanged,
    Changed,
    Failed,
}

impl ChangeStatus {
    pub fn value(self) -> i64 {
        match self {
            Self::Unchanged => 0,
            Self::Changed => 1,
            Self::Failed => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub value: i64,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
}

/// Labels shared by every event of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricLabels {
    pub function_name: String,
    pub folder_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsBatch {
    labels: MetricLabels,
    events: Vec<MetricEvent>,
}

impl MetricsBatch {
    pub fn new(labels: MetricLabels) -> Self {
        Self {
            labels,
            events: Vec::new(),
        }
    }

    pub fn router_state(&mut self, router_ip: &str, healthy: bool) {
        let labels = [
            ("router_ip", router_ip.to_string()),
            ("folder_name", self.labels.folder_name.clone()),
        ];
        self.push(ROUTER_STATE, labels, i64::from(healthy));
    }

    pub fn table_changed(&mut self, table_name: &str, status: ChangeStatus) {
        let labels = [
            ("route_switcher_name", self.labels.function_name.clone()),
            ("route_table_name", table_name.to_string()),
            ("folder_name", self.labels.folder_name.clone()),
        ];
        self.push(TABLE_CHANGED, labels, status.value());
    }

    pub fn switchover(&mut self, required: bool) {
        let labels = [
            ("route_switcher_name", self.labels.function_name.clone()),
            ("folder_name", self.labels.folder_name.clone()),
        ];
        self.push(SWITCHOVER, labels, i64::from(required));
    }

    pub fn security_groups_changed(&mut self, router_ip: &str, index: u32, status: ChangeStatus) {
        let labels = [
            ("route_switcher_name", self.labels.function_name.clone()),
            ("router_ip", router_ip.to_string()),
            ("interface_index", index.to_string()),
            ("folder_name", self.labels.folder_name.clone()),
        ];
        self.push(SECURITY_GROUPS_CHANGED, labels, status.value());
    }

    pub fn events(&self) -> &[MetricEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drain collected events, keeping the labels for further use.
    pub fn take(&mut self) -> Vec<MetricEvent> {
        std::mem::take(&mut self.events)
    }

    fn push<const N: usize>(&mut self, name: &str, labels: [(&str, String); N], value: i64) {
        self.events.push(MetricEvent {
            name: name.to_string(),
            labels: labels
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
            kind: MetricKind::IntGauge,
            value,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> MetricsBatch {
        MetricsBatch::new(MetricLabels {
            function_name: "rsw-prod".into(),
            folder_name: "net".into(),
        })
    }

    #[test]
    fn test_router_state_values() {
        let mut metrics = batch();
        metrics.router_state("10.0.0.1", true);
        metrics.router_state("10.0.0.2", false);
        let values: Vec<i64> = metrics.events().iter().map(|e| e.value).collect();
        assert_eq!(values, vec![1, 0]);
        assert_eq!(metrics.events()[0].labels["router_ip"], "10.0.0.1");
        assert_eq!(metrics.events()[0].labels["folder_name"], "net");
    }

    #[test]
    fn test_table_changed_failed_is_two() {
        let mut metrics = batch();
        metrics.table_changed("main", ChangeStatus::Failed);
        let event = &metrics.events()[0];
        assert_eq!(event.name, TABLE_CHANGED);
        assert_eq!(event.value, 2);
        assert_eq!(event.labels["route_switcher_name"], "rsw-prod");
    }

    #[test]
    fn test_event_serializes_wire_field_names() {
        let mut metrics = batch();
        metrics.security_groups_changed("10.0.0.1", 1, ChangeStatus::Changed);
        let json = serde_json::to_value(&metrics.events()[0]).unwrap();
        assert_eq!(json["type"], "IGAUGE");
        assert_eq!(json["labels"]["interface_index"], "1");
        assert!(json.get("ts").is_some());
    }

    #[test]
    fn test_take_drains_events() {
        let mut metrics = batch();
        metrics.switchover(false);
        assert_eq!(metrics.take().len(), 1);
        assert!(metrics.is_empty());
    }
}
