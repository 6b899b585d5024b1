// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::ScanService;

/// Spawn the periodic all-sources scan. The first tick fires immediately;
/// missed ticks are delayed rather than bunched up. The lookback of each
/// scan equals the interval.
pub fn spawn_scan_scheduler(
    service: Arc<ScanService>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "scheduler", "scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match service.scan(None, false).await {
                Ok(report) => tracing::info!(
                    target: "scheduler",
                    matched = report.posts.len(),
                    failed = report.failures.len(),
                    "scheduled scan tick"
                ),
                Err(e) => tracing::error!(target: "scheduler", error = %e, "scheduled scan failed"),
            }
        }
    })
}
