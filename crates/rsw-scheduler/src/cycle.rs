//! Time-boxed repetition of reconciliation passes within one invocation.

use std::time::Duration;

use rsw_config::Settings;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{error, info, warn};

use crate::pass::{PassContext, load_document, run_pass};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOptions {
    /// Wall-clock budget of the invocation.
    pub budget: Duration,
    /// Minimum spacing between pass starts.
    pub interval: Duration,
}

impl From<&Settings> for CycleOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            budget: settings.invocation_budget(),
            interval: settings.pass_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleExit {
    /// No time left for another pass.
    BudgetExhausted,
    /// A pass issued mutations; the next invocation observes their effect.
    Settled,
    /// `updating_tables` outlived the budget and was force-cleared.
    FlagCleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub passes: usize,
    pub failed_passes: usize,
    pub exit: CycleExit,
}

/// Run passes until the budget is spent or a pass settles.
///
/// `updating_tables` is advisory: while it is set no pass runs, and once
/// waiting another interval would overrun the budget it is cleared so the
/// next invocation can reconcile.
pub async fn run_cycle(ctx: &PassContext, options: CycleOptions) -> CycleSummary {
    let deadline = Instant::now() + options.budget;
    let mut passes = 0;
    let mut failed_passes = 0;

    loop {
        let started = Instant::now();
        let next_start = started + options.interval;

        match load_document(ctx).await {
            Ok(mut document) if document.updating_tables => {
                if next_start < deadline {
                    info!(
                        "Route tables are being updated by another pass, retrying in {}s",
                        options.interval.as_secs()
                    );
                    sleep(options.interval).await;
                    continue;
                }
                warn!("updating_tables is still set at the end of the invocation, clearing it");
                document.updating_tables = false;
                if let Err(e) = ctx.store.put(&document).await {
                    error!("Failed to clear updating_tables: {:#}", e);
                }
                return CycleSummary {
                    passes,
                    failed_passes,
                    exit: CycleExit::FlagCleared,
                };
            }
            Ok(document) => {
                passes += 1;
                match run_pass(ctx, document).await {
                    Ok(report) if report.settled() => {
                        info!("Mutations issued, ending invocation to let them settle");
                        return CycleSummary {
                            passes,
                            failed_passes,
                            exit: CycleExit::Settled,
                        };
                    }
                    Ok(report) => {
                        if report.has_errors() {
                            warn!("Pass finished with per-item errors");
                        }
                    }
                    Err(e) => {
                        failed_passes += 1;
                        error!("Pass aborted: {}", e);
                    }
                }
            }
            Err(e) => {
                failed_passes += 1;
                error!("Pass aborted: {}", e);
            }
        }

        if next_start >= deadline {
            return CycleSummary {
                passes,
                failed_passes,
                exit: CycleExit::BudgetExhausted,
            };
        }
        sleep_until(next_start).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsw_cloud::memory::Fault;
    use rsw_core::FailbackPolicy;

    use crate::test_support::*;

    fn options(budget_secs: u64, interval_secs: u64) -> CycleOptions {
        CycleOptions {
            budget: Duration::from_secs(budget_secs),
            interval: Duration::from_secs(interval_secs),
        }
    }

    #[test]
    fn test_options_from_settings() {
        let settings = Settings {
            cron_interval_minutes: 3,
            healthcheck_interval_secs: 20,
            ..Settings::default()
        };
        assert_eq!(CycleOptions::from(&settings), options(180, 20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_converged_world_runs_until_budget() {
        let world = World::new(FailbackPolicy::BackToPrimary, R1, true, true);
        let start = Instant::now();

        let summary = run_cycle(&world.ctx, options(180, 60)).await;

        assert_eq!(summary.exit, CycleExit::BudgetExhausted);
        assert_eq!(summary.passes, 3);
        assert_eq!(summary.failed_passes, 0);
        assert_eq!(start.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_budget_runs_a_single_pass() {
        let world = World::new(FailbackPolicy::BackToPrimary, R1, true, true);

        let summary = run_cycle(&world.ctx, options(60, 60)).await;

        assert_eq!(summary.passes, 1);
        assert_eq!(summary.exit, CycleExit::BudgetExhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutating_pass_ends_invocation() {
        let world = World::new(FailbackPolicy::BackToPrimary, R1, false, true);

        let summary = run_cycle(&world.ctx, options(600, 60)).await;

        assert_eq!(summary.exit, CycleExit::Settled);
        assert_eq!(summary.passes, 1);
        assert_eq!(world.cloud.table_writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_passes_do_not_stop_the_cycle() {
        let world = World::new(FailbackPolicy::BackToPrimary, R1, false, false);

        let summary = run_cycle(&world.ctx, options(180, 60)).await;

        assert_eq!(summary.passes, 3);
        assert_eq!(summary.failed_passes, 3);
        assert_eq!(summary.exit, CycleExit::BudgetExhausted);
        assert!(world.cloud.table_writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_flag_is_cleared_when_budget_runs_out() {
        let world = World::new(FailbackPolicy::BackToPrimary, R1, false, true);
        world.edit_document(|doc| doc.updating_tables = true);
        let start = Instant::now();

        let summary = run_cycle(&world.ctx, options(180, 60)).await;

        assert_eq!(summary.exit, CycleExit::FlagCleared);
        assert_eq!(summary.passes, 0);
        assert_eq!(start.elapsed(), Duration::from_secs(120));
        assert!(world.cloud.table_writes().is_empty());
        assert!(!world.stored().updating_tables);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pass_runs_once_flag_is_released() {
        let world = World::new(FailbackPolicy::BackToPrimary, R1, false, true);
        world.edit_document(|doc| doc.updating_tables = true);

        let cycle = run_cycle(&world.ctx, options(300, 60));
        let release = async {
            sleep(Duration::from_secs(90)).await;
            world.edit_document(|doc| doc.updating_tables = false);
        };
        let (summary, ()) = tokio::join!(cycle, release);

        assert_eq!(summary.exit, CycleExit::Settled);
        assert_eq!(summary.passes, 1);
        assert_eq!(world.cloud.table_writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_document_counts_as_failed_pass() {
        let world = World::new(FailbackPolicy::BackToPrimary, R1, true, true);
        world.cloud.fail(Fault::Get);

        let summary = run_cycle(&world.ctx, options(120, 60)).await;

        assert_eq!(summary.passes, 0);
        assert_eq!(summary.failed_passes, 2);
    }
}
