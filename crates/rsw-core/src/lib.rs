//! Core types: persisted document, observed network state, nexthop topology,
//! metric events and the error taxonomy shared by every route-switcher crate.

pub mod document;
pub mod error;
pub mod metrics;
pub mod observed;
pub mod topology;

pub use document::{Document, FailbackPolicy, InterfaceConfig, RouteTableConfig, RouterConfig};
pub use error::{ConfigError, DriftError, HealthError, MutationError, PassError};
pub use metrics::{ChangeStatus, MetricEvent, MetricKind, MetricLabels, MetricsBatch};
pub use observed::{HealthSnapshot, LiveInterface, ObservedRouteTable, StaticRoute, TargetStatus};
pub use topology::Topology;
