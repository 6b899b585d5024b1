// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scan_runs_total", "Scans started (any trigger).");
        describe_counter!(
            "scan_posts_matched_total",
            "Posts handed to the notifier after filtering."
        );
        describe_counter!(
            "scan_source_failures_total",
            "Sources that contributed nothing to a scan because of an error."
        );
        describe_counter!(
            "scan_retries_total",
            "Upstream calls retried after a transient failure."
        );
        describe_counter!(
            "scan_reauth_total",
            "Re-authentications after a session expired mid-fetch."
        );
        describe_counter!(
            "scan_subtarget_skips_total",
            "Sub-targets or streams abandoned after retries ran out."
        );
        describe_counter!(
            "scan_items_checked_total",
            "Upstream items inspected (before cutoff and matching)."
        );
        describe_gauge!("scan_last_run_ts", "Unix ts when a scan last finished.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Only the first call installs; later
    /// calls share its handle.
    pub fn init() -> anyhow::Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE
            .get_or_try_init(|| PrometheusBuilder::new().install_recorder())
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?
            .clone();
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
