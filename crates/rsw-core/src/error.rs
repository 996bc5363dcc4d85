//! Error taxonomy for a reconciliation pass.
//!
//! `ConfigError` and `HealthError` invalidate the whole pass. `DriftError` and
//! `MutationError` are isolated to one route table or interface and reported
//! per item.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Config document not found at '{0}'")]
    DocumentNotFound(String),

    #[error("Config document is malformed: {0}")]
    Malformed(String),

    #[error("No routers configured")]
    NoRouters,

    #[error("No route tables configured")]
    NoRouteTables,

    #[error("Router #{position} has no healthchecked_ip")]
    MissingHealthcheckAddress { position: usize },

    #[error("Router {router} has no interfaces")]
    NoInterfaces { router: String },

    #[error("Router {router} has an interface with '{present}' but without '{missing}'")]
    IncompleteInterface {
        router: String,
        present: &'static str,
        missing: &'static str,
    },

    #[error("Router {router} has security group interfaces but no vm_id")]
    MissingVmId { router: String },

    #[error("Router {router} has vm_id but no interface with index and security_group_ids")]
    VmWithoutSecurityGroups { router: String },

    #[error(
        "Invalid swap topology: {vm_routers} router(s) with vm_id and {primaries} primary; expected 2 with exactly 1 primary"
    )]
    InvalidTopology { vm_routers: usize, primaries: usize },

    #[error("Router {router} is not a target of load balancer {load_balancer}")]
    RouterNotInTargetGroup {
        router: String,
        load_balancer: String,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthError {
    #[error("Health source unavailable: {0}")]
    Unavailable(String),

    #[error("At least two health targets are required, found {found}")]
    InsufficientTargets { found: usize },

    #[error("All {} health targets are unhealthy", .addresses.len())]
    AllUnhealthy { addresses: Vec<String> },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DriftError {
    #[error("Route table {table} could not be read: {reason}")]
    Unreadable { table: String, reason: String },

    #[error("Route table {table} has no routes")]
    EmptyTable { table: String },
}

impl DriftError {
    pub fn table(&self) -> &str {
        match self {
            Self::Unreadable { table, .. } | Self::EmptyTable { table } => table,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("Request for {target} failed: {reason}")]
    Request { target: String, reason: String },

    #[error("Mutation task for {target} did not complete: {reason}")]
    TaskFailed { target: String, reason: String },
}

/// Errors that end the current pass without mutating anything further.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error("Failed to load config document: {0}")]
    Load(String),

    #[error("Failed to persist config document: {0}")]
    Persist(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_document_not_found() {
        let err = ConfigError::DocumentNotFound("/etc/rsw/config.yaml".into());
        assert_eq!(
            err.to_string(),
            "Config document not found at '/etc/rsw/config.yaml'"
        );
    }

    #[test]
    fn test_display_incomplete_interface() {
        let err = ConfigError::IncompleteInterface {
            router: "10.0.0.1".into(),
            present: "index",
            missing: "security_group_ids",
        };
        assert_eq!(
            err.to_string(),
            "Router 10.0.0.1 has an interface with 'index' but without 'security_group_ids'"
        );
    }

    #[test]
    fn test_display_invalid_topology() {
        let err = ConfigError::InvalidTopology {
            vm_routers: 3,
            primaries: 1,
        };
        assert!(err.to_string().starts_with("Invalid swap topology: 3 router(s)"));
    }

    #[test]
    fn test_display_all_unhealthy_counts_targets() {
        let err = HealthError::AllUnhealthy {
            addresses: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "All 2 health targets are unhealthy");
    }

    #[test]
    fn test_display_insufficient_targets() {
        let err = HealthError::InsufficientTargets { found: 1 };
        assert_eq!(
            err.to_string(),
            "At least two health targets are required, found 1"
        );
    }

    #[test]
    fn test_drift_error_table_accessor() {
        let err = DriftError::Unreadable {
            table: "rt-1".into(),
            reason: "timeout".into(),
        };
        assert_eq!(err.table(), "rt-1");
        assert_eq!(DriftError::EmptyTable { table: "rt-2".into() }.table(), "rt-2");
    }

    #[test]
    fn test_pass_error_is_transparent_over_health() {
        let err: PassError = HealthError::InsufficientTargets { found: 0 }.into();
        assert_eq!(
            err.to_string(),
            "At least two health targets are required, found 0"
        );
    }

    #[test]
    fn test_errors_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConfigError>();
        assert_send_sync::<HealthError>();
        assert_send_sync::<DriftError>();
        assert_send_sync::<MutationError>();
        assert_send_sync::<PassError>();
    }
}
