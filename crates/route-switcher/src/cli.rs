use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use rsw_config::SettingsOverrides;

#[derive(Parser)]
#[command(name = "route-switcher")]
#[command(about = "Route Switcher: health-driven failover of next hops and security groups")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one invocation: repeated passes within the time budget
    Run,

    /// Run a single pass and print its report
    Once,

    /// Validate the config document and print the router topology
    Check,

    /// Force-clear the updating_tables flag
    Unlock,
}

#[derive(Args)]
pub struct OverrideArgs {
    /// Path of the persisted YAML document
    #[arg(long, env = "CONFIG_PATH")]
    pub document: Option<PathBuf>,

    /// Invocation budget in minutes (1..=10)
    #[arg(long, env = "CRON_INTERVAL")]
    pub cron_interval: Option<u64>,

    /// Seconds between passes (>= 10)
    #[arg(long, env = "ROUTER_HCHK_INTERVAL")]
    pub healthcheck_interval: Option<u64>,

    /// Return traffic to the primary router once it recovers
    #[arg(long, env = "BACK_TO_PRIMARY", value_parser = BoolishValueParser::new())]
    pub back_to_primary: Option<bool>,

    /// folder_name metric label
    #[arg(long, env = "FOLDER_NAME")]
    pub folder_name: Option<String>,

    /// Folder receiving the metrics
    #[arg(long, env = "FOLDER_ID")]
    pub folder_id: Option<String>,

    /// route_switcher_name metric label
    #[arg(long, env = "FUNCTION_NAME")]
    pub function_name: Option<String>,

    /// Bearer token for the cloud APIs
    #[arg(long, env = "YC_IAM_TOKEN", hide_env_values = true)]
    pub iam_token: Option<String>,
}

impl From<OverrideArgs> for SettingsOverrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            document_path: args.document,
            cron_interval_minutes: args.cron_interval,
            healthcheck_interval_secs: args.healthcheck_interval,
            back_to_primary: args.back_to_primary,
            folder_name: args.folder_name,
            folder_id: args.folder_id,
            function_name: args.function_name,
            iam_token: args.iam_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_map_to_overrides() {
        let cli = Cli::try_parse_from([
            "route-switcher",
            "--document",
            "/etc/rsw/config.yaml",
            "--back-to-primary",
            "false",
            "--cron-interval",
            "5",
            "once",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Once));

        let overrides = SettingsOverrides::from(cli.overrides);
        assert_eq!(
            overrides.document_path,
            Some(PathBuf::from("/etc/rsw/config.yaml"))
        );
        assert_eq!(overrides.back_to_primary, Some(false));
        assert_eq!(overrides.cron_interval_minutes, Some(5));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["route-switcher"]).is_err());
    }

    #[test]
    fn test_back_to_primary_ignores_case() {
        for (raw, expected) in [("True", true), ("TRUE", true), ("False", false), ("no", false)] {
            let cli = Cli::try_parse_from(["route-switcher", "--back-to-primary", raw, "check"])
                .unwrap();
            assert_eq!(cli.overrides.back_to_primary, Some(expected), "{raw}");
        }
    }
}
