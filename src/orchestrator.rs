// src/orchestrator.rs
//! Runs one scan across sources: every adapter concurrently, failures
//! isolated per source, optional secondary filter, then the notifier.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::{counter, gauge};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{KeywordConfig, Settings};
use crate::error::{Result, ScanError, SourceFailure};
use crate::metrics::ensure_metrics_described;
use crate::model::{CanonicalPost, ScanWindow, SourceKind};
use crate::notify::Notifier;
use crate::secondary_filter::SecondaryFilter;
use crate::sources::{build_adapters, AdapterDeps, SourceAdapter};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub posts: Vec<CanonicalPost>,
    pub failures: Vec<SourceFailure>,
}

pub struct ScanOrchestrator {
    interval: Duration,
    timeout: Duration,
    notifier: Arc<dyn Notifier>,
    secondary: Option<Arc<dyn SecondaryFilter>>,
    shutdown: CancellationToken,
}

async fn run_one(
    adapter: &mut dyn SourceAdapter,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<CanonicalPost>> {
    let res = match adapter.initialize(cancel).await {
        // Window is taken after authentication, right before fetching.
        Ok(()) => {
            let window = ScanWindow::ending_now(interval);
            adapter.fetch_since(&window, cancel).await
        }
        Err(e) => Err(e),
    };
    adapter.close().await;
    res
}

impl ScanOrchestrator {
    pub fn new(interval: Duration, timeout: Duration, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            interval,
            timeout,
            notifier,
            secondary: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_secondary(mut self, filter: Arc<dyn SecondaryFilter>) -> Self {
        self.secondary = Some(filter);
        self
    }

    /// Cancelling `token` stops in-flight scans the same way the timeout does.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn run_scan(
        &self,
        sources: &mut [Box<dyn SourceAdapter>],
        apply_secondary_filter: bool,
    ) -> Result<ScanReport> {
        ensure_metrics_described();
        counter!("scan_runs_total").increment(1);

        if sources.is_empty() {
            tracing::info!(target: "scan", "no sources to scan");
            return Ok(ScanReport::default());
        }

        let kinds: Vec<SourceKind> = sources.iter().map(|s| s.kind()).collect();
        let total = kinds.len();
        let cancel = self.shutdown.child_token();
        let interval = self.interval;

        let run = join_all(
            sources
                .iter_mut()
                .map(|a| run_one(a.as_mut(), interval, &cancel)),
        );
        tokio::pin!(run);
        let outcomes = match tokio::time::timeout(self.timeout, &mut run).await {
            Ok(out) => out,
            Err(_) => {
                tracing::warn!(
                    target: "scan",
                    timeout_secs = self.timeout.as_secs(),
                    "scan timed out; cancelling sources"
                );
                cancel.cancel();
                run.await
            }
        };

        let mut posts = Vec::new();
        let mut failures = Vec::new();
        for (kind, outcome) in kinds.into_iter().zip(outcomes) {
            match outcome {
                Ok(found) => {
                    tracing::info!(target: "scan", source = %kind, matched = found.len(), "source finished");
                    posts.extend(found);
                }
                Err(e) => {
                    counter!("scan_source_failures_total", "source" => kind.as_str()).increment(1);
                    tracing::error!(target: "scan", source = %kind, error = %e, "source failed");
                    failures.push(SourceFailure {
                        source: kind.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if failures.len() == total {
            return Err(ScanError::AllSourcesFailed { failures });
        }

        if apply_secondary_filter && !posts.is_empty() {
            match &self.secondary {
                Some(filter) => {
                    let before = posts.len();
                    posts = filter
                        .filter(posts)
                        .await
                        .map_err(|e| ScanError::SecondaryFilter(format!("{e:#}")))?;
                    tracing::info!(target: "scan", filter = filter.name(), before, after = posts.len(), "secondary filter applied");
                }
                None => {
                    tracing::warn!(target: "scan", "secondary filter requested but not configured; using raw matches")
                }
            }
        }

        counter!("scan_posts_matched_total").increment(posts.len() as u64);
        gauge!("scan_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

        if posts.is_empty() {
            tracing::info!(target: "scan", failed = failures.len(), "scan finished with no matches");
        } else {
            tracing::info!(target: "scan", matched = posts.len(), failed = failures.len(), "scan finished");
            if let Err(e) = self.notifier.notify(&posts).await {
                tracing::warn!(target: "scan", notifier = self.notifier.name(), error = ?e, "notifier failed");
            }
        }

        Ok(ScanReport { posts, failures })
    }
}

/// Everything a trigger (HTTP, timer, CLI) needs to run a scan.
pub struct ScanService {
    settings: Settings,
    keywords: Arc<KeywordConfig>,
    deps: AdapterDeps,
    orchestrator: ScanOrchestrator,
}

impl ScanService {
    pub fn new(
        settings: Settings,
        keywords: Arc<KeywordConfig>,
        deps: AdapterDeps,
        orchestrator: ScanOrchestrator,
    ) -> Self {
        Self {
            settings,
            keywords,
            deps,
            orchestrator,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Enabled in the keyword config and has credentials.
    pub fn is_configured(&self, kind: SourceKind) -> bool {
        self.keywords.get(kind).is_some_and(|c| c.enabled) && self.settings.has_credentials(kind)
    }

    pub async fn scan(&self, only: Option<SourceKind>, apply_filter: bool) -> Result<ScanReport> {
        let mut adapters = build_adapters(&self.settings, &self.keywords, &self.deps, only)
            .map_err(|e| ScanError::Fatal(format!("building adapters: {e:#}")))?;
        self.orchestrator.run_scan(&mut adapters, apply_filter).await
    }
}
