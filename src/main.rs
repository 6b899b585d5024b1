//! Social Listener: binary entrypoint.
//! Boots the Axum HTTP trigger surface and, when enabled, the periodic scan.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tokio_util::sync::CancellationToken;

use social_listener::api::{self, AppState};
use social_listener::bootstrap::{build_service, init_tracing, load_keywords};
use social_listener::config::Settings;
use social_listener::metrics::Metrics;
use social_listener::scheduler::spawn_scan_scheduler;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::from_env()?;
    let keywords = load_keywords(&settings)?;
    let metrics = Metrics::init()?;

    let shutdown = CancellationToken::new();
    let schedule = settings.schedule_enabled;
    let interval = settings.scan_interval;
    let service = Arc::new(build_service(settings, keywords, shutdown.clone())?);

    if schedule {
        spawn_scan_scheduler(service.clone(), interval, shutdown);
    } else {
        tracing::info!(target: "scheduler", "periodic scans disabled (SCAN_SCHEDULE != 1)");
    }

    let router = api::router(AppState::new(service), Some(&metrics));
    Ok(router.into())
}
