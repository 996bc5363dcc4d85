use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rsw_core::{FailbackPolicy, MetricLabels};
use serde::{Deserialize, Serialize};

/// Runtime settings of one invocation.
///
/// Loaded from an optional TOML file, then overridden by CLI flags (which in
/// turn fall back to the environment of the deployed function).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Location of the persisted YAML document.
    #[serde(default)]
    pub document_path: Option<PathBuf>,

    /// Invocation time budget in minutes.
    #[serde(default = "default_cron_interval_minutes")]
    pub cron_interval_minutes: u64,

    /// Minimum interval between two passes, in seconds.
    #[serde(default = "default_healthcheck_interval_secs")]
    pub healthcheck_interval_secs: u64,

    #[serde(default = "default_back_to_primary")]
    pub back_to_primary: bool,

    #[serde(default)]
    pub folder_name: String,

    /// Monitoring target folder.
    #[serde(default)]
    pub folder_id: String,

    #[serde(default = "default_function_name")]
    pub function_name: String,

    /// Upper bound on concurrently dispatched mutations.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    #[serde(default, skip_serializing)]
    pub iam_token: Option<String>,

    #[serde(default)]
    pub api: ApiEndpoints,
}

/// Base URLs of the cloud REST APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoints {
    #[serde(default = "default_load_balancer_endpoint")]
    pub load_balancer: String,
    #[serde(default = "default_vpc_endpoint")]
    pub vpc: String,
    #[serde(default = "default_compute_endpoint")]
    pub compute: String,
    #[serde(default = "default_operation_endpoint")]
    pub operation: String,
    #[serde(default = "default_monitoring_endpoint")]
    pub monitoring: String,
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub document_path: Option<PathBuf>,
    pub cron_interval_minutes: Option<u64>,
    pub healthcheck_interval_secs: Option<u64>,
    pub back_to_primary: Option<bool>,
    pub folder_name: Option<String>,
    pub folder_id: Option<String>,
    pub function_name: Option<String>,
    pub iam_token: Option<String>,
}

fn default_cron_interval_minutes() -> u64 {
    1
}

fn default_healthcheck_interval_secs() -> u64 {
    60
}

fn default_back_to_primary() -> bool {
    true
}

fn default_function_name() -> String {
    "route-switcher".to_string()
}

fn default_max_parallel() -> usize {
    8
}

fn default_load_balancer_endpoint() -> String {
    "https://load-balancer.api.cloud.yandex.net/load-balancer/v1".to_string()
}

fn default_vpc_endpoint() -> String {
    "https://vpc.api.cloud.yandex.net/vpc/v1".to_string()
}

fn default_compute_endpoint() -> String {
    "https://compute.api.cloud.yandex.net/compute/v1".to_string()
}

fn default_operation_endpoint() -> String {
    "https://operation.api.cloud.yandex.net".to_string()
}

fn default_monitoring_endpoint() -> String {
    "https://monitoring.api.cloud.yandex.net/monitoring/v2".to_string()
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            load_balancer: default_load_balancer_endpoint(),
            vpc: default_vpc_endpoint(),
            compute: default_compute_endpoint(),
            operation: default_operation_endpoint(),
            monitoring: default_monitoring_endpoint(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            document_path: None,
            cron_interval_minutes: default_cron_interval_minutes(),
            healthcheck_interval_secs: default_healthcheck_interval_secs(),
            back_to_primary: default_back_to_primary(),
            folder_name: String::new(),
            folder_id: String::new(),
            function_name: default_function_name(),
            max_parallel: default_max_parallel(),
            iam_token: None,
            api: ApiEndpoints::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))
    }

    pub fn with_overrides(mut self, overrides: SettingsOverrides) -> Self {
        if let Some(path) = overrides.document_path {
            self.document_path = Some(path);
        }
        if let Some(minutes) = overrides.cron_interval_minutes {
            self.cron_interval_minutes = minutes;
        }
        if let Some(secs) = overrides.healthcheck_interval_secs {
            self.healthcheck_interval_secs = secs;
        }
        if let Some(enabled) = overrides.back_to_primary {
            self.back_to_primary = enabled;
        }
        if let Some(name) = overrides.folder_name {
            self.folder_name = name;
        }
        if let Some(id) = overrides.folder_id {
            self.folder_id = id;
        }
        if let Some(name) = overrides.function_name {
            self.function_name = name;
        }
        if overrides.iam_token.is_some() {
            self.iam_token = overrides.iam_token;
        }
        self
    }

    pub fn invocation_budget(&self) -> Duration {
        Duration::from_secs(self.cron_interval_minutes.saturating_mul(60))
    }

    pub fn pass_interval(&self) -> Duration {
        Duration::from_secs(self.healthcheck_interval_secs)
    }

    pub fn policy(&self) -> FailbackPolicy {
        FailbackPolicy::from_back_to_primary(self.back_to_primary)
    }

    pub fn metric_labels(&self) -> MetricLabels {
        MetricLabels {
            function_name: self.function_name.clone(),
            folder_name: self.folder_name.clone(),
        }
    }
}
