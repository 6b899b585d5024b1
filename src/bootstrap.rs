// src/bootstrap.rs
//! Process wiring shared by the server and the CLI.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{KeywordConfig, Settings};
use crate::matcher::semantic::{Embedder, OpenAiEmbedder};
use crate::notify::{email::EmailNotifier, LogNotifier, Notifier};
use crate::orchestrator::{ScanOrchestrator, ScanService};
use crate::secondary_filter::OpenAiFilter;
use crate::session::SessionStore;
use crate::sources::AdapterDeps;

/// Our events use short targets (`scan`, `session`, ...) rather than module paths.
pub const DEFAULT_LOG_FILTER: &str =
    "social_listener=info,scan=info,session=info,scheduler=info,notify=info,filter=info,warn";

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    // Shuttle (or a test) may already have installed one.
    let _ = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
}

fn build_notifier(settings: &Settings) -> Arc<dyn Notifier> {
    match &settings.smtp {
        Some(smtp) => match EmailNotifier::from_settings(smtp) {
            Ok(n) => return Arc::new(n),
            Err(e) => warn!(error = ?e, "email notifier misconfigured; falling back to log notifier"),
        },
        None => info!("SMTP not configured; matches will only be logged"),
    }
    Arc::new(LogNotifier)
}

/// Build the scan service from settings and keyword config.
pub fn build_service(
    settings: Settings,
    keywords: KeywordConfig,
    shutdown: CancellationToken,
) -> Result<ScanService> {
    let notifier = build_notifier(&settings);

    let mut orchestrator = ScanOrchestrator::new(settings.scan_interval, settings.scan_timeout, notifier)
        .with_shutdown(shutdown);

    let mut embedder: Option<Arc<dyn Embedder>> = None;
    if let Some(key) = &settings.openai_api_key {
        orchestrator = orchestrator.with_secondary(Arc::new(OpenAiFilter::new(key.clone())?));
        embedder = Some(Arc::new(OpenAiEmbedder::new(key.clone())?));
    }

    let deps = AdapterDeps {
        sessions: Arc::new(SessionStore::file(settings.session_dir.clone())),
        retry: settings.retry,
        embedder,
    };

    for cfg in keywords.enabled() {
        if !settings.has_credentials(cfg.kind) {
            warn!(source = %cfg.kind, "enabled in keyword config but credentials are missing");
        }
    }
    info!(
        sources = keywords.enabled().count(),
        interval_secs = settings.scan_interval.as_secs(),
        timeout_secs = settings.scan_timeout.as_secs(),
        "scan service ready"
    );

    Ok(ScanService::new(settings, Arc::new(keywords), deps, orchestrator))
}

/// Keyword config from `Settings::keywords_path`, or the default locations.
pub fn load_keywords(settings: &Settings) -> Result<KeywordConfig> {
    match &settings.keywords_path {
        Some(p) => KeywordConfig::load_from(p),
        None => KeywordConfig::load_default(),
    }
}
