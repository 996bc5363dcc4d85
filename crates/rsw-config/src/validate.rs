use anyhow::{Result, bail};
use tracing::warn;

use crate::settings::Settings;

/// The invocation budget never exceeds this many minutes.
pub const MAX_CRON_INTERVAL_MINUTES: u64 = 10;

/// Passes are never scheduled closer than this.
pub const MIN_HEALTHCHECK_INTERVAL_SECS: u64 = 10;

/// Validate settings and clamp the timing knobs into their safe ranges.
pub fn validate_settings(mut settings: Settings) -> Result<Settings> {
    match settings.document_path.as_deref() {
        None => bail!("document_path is required (set --document or CONFIG_PATH)"),
        Some(path) if path.as_os_str().is_empty() => bail!("document_path cannot be empty"),
        Some(_) => {}
    }

    if settings.max_parallel == 0 {
        bail!("max_parallel must be >= 1 (got 0)");
    }

    if settings.function_name.trim().is_empty() {
        bail!("function_name cannot be empty");
    }

    if settings.cron_interval_minutes > MAX_CRON_INTERVAL_MINUTES {
        warn!(
            requested = settings.cron_interval_minutes,
            max = MAX_CRON_INTERVAL_MINUTES,
            "cron_interval_minutes clamped"
        );
        settings.cron_interval_minutes = MAX_CRON_INTERVAL_MINUTES;
    } else if settings.cron_interval_minutes == 0 {
        warn!("cron_interval_minutes of 0 raised to 1");
        settings.cron_interval_minutes = 1;
    }

    if settings.healthcheck_interval_secs < MIN_HEALTHCHECK_INTERVAL_SECS {
        warn!(
            requested = settings.healthcheck_interval_secs,
            min = MIN_HEALTHCHECK_INTERVAL_SECS,
            "healthcheck_interval_secs clamped"
        );
        settings.healthcheck_interval_secs = MIN_HEALTHCHECK_INTERVAL_SECS;
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn valid() -> Settings {
        Settings {
            document_path: Some(PathBuf::from("/tmp/config.yaml")),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_settings_pass_through() {
        let settings = validate_settings(valid()).unwrap();
        assert_eq!(settings.cron_interval_minutes, 1);
        assert_eq!(settings.healthcheck_interval_secs, 60);
    }

    #[test]
    fn test_missing_document_path_fails() {
        let err = validate_settings(Settings::default()).unwrap_err();
        assert!(err.to_string().contains("document_path is required"));
    }

    #[test]
    fn test_zero_parallelism_fails() {
        let settings = Settings {
            max_parallel: 0,
            ..valid()
        };
        let err = validate_settings(settings).unwrap_err();
        assert_eq!(err.to_string(), "max_parallel must be >= 1 (got 0)");
    }

    #[test]
    fn test_cron_interval_clamped_to_max() {
        let settings = Settings {
            cron_interval_minutes: 45,
            ..valid()
        };
        let settings = validate_settings(settings).unwrap();
        assert_eq!(settings.cron_interval_minutes, MAX_CRON_INTERVAL_MINUTES);
    }

    #[test]
    fn test_zero_cron_interval_raised() {
        let settings = Settings {
            cron_interval_minutes: 0,
            ..valid()
        };
        assert_eq!(validate_settings(settings).unwrap().cron_interval_minutes, 1);
    }

    #[test]
    fn test_healthcheck_interval_clamped_to_min() {
        let settings = Settings {
            healthcheck_interval_secs: 3,
            ..valid()
        };
        let settings = validate_settings(settings).unwrap();
        assert_eq!(
            settings.healthcheck_interval_secs,
            MIN_HEALTHCHECK_INTERVAL_SECS
        );
    }
}
