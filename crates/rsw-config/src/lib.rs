//! Runtime settings loading and validation (settings TOML + CLI/env overrides).

pub mod settings;
pub mod validate;

pub use settings::{ApiEndpoints, Settings, SettingsOverrides};
pub use validate::{
    MAX_CRON_INTERVAL_MINUTES, MIN_HEALTHCHECK_INTERVAL_SECS, validate_settings,
};
