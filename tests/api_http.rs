// tests/api_http.rs
//
// HTTP-level tests for the trigger Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health (open)
// - GET /scan without / with wrong / with correct basic auth
// - GET /scan/{source}: unknown and unconfigured sources are 404
// - GET /metrics only when a recorder is passed in

use std::sync::Arc;
use std::time::Duration;

use axum::body::{self, Body};
use axum::Router;
use base64::Engine as _;
use http::{header, Request, StatusCode};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use social_listener::api::{self, AppState};
use social_listener::config::{KeywordConfig, Settings, SourceConfig};
use social_listener::metrics::Metrics;
use social_listener::model::SourceKind;
use social_listener::notify::LogNotifier;
use social_listener::orchestrator::{ScanOrchestrator, ScanService};
use social_listener::retry::RetryPolicy;
use social_listener::session::SessionStore;
use social_listener::sources::AdapterDeps;

const BODY_LIMIT: usize = 1024 * 1024;

/// Reddit is enabled in the keyword config but has no credentials, so no
/// adapter is ever built and nothing touches the network.
fn service(auth: bool) -> Arc<ScanService> {
    let settings = Settings::from_lookup(|k| match (auth, k) {
        (true, "API_USERNAME") => Some("ops".to_string()),
        (true, "API_PASSWORD") => Some("hunter2".to_string()),
        _ => None,
    })
    .expect("settings");
    let keywords = KeywordConfig::from_sources([SourceConfig::new(
        SourceKind::Reddit,
        &["crm"],
        &["SaaS"],
    )]);
    let orchestrator = ScanOrchestrator::new(
        Duration::from_secs(3600),
        Duration::from_secs(5),
        Arc::new(LogNotifier),
    );
    let deps = AdapterDeps {
        sessions: Arc::new(SessionStore::in_memory()),
        retry: RetryPolicy::default(),
        embedder: None,
    };
    Arc::new(ScanService::new(settings, Arc::new(keywords), deps, orchestrator))
}

fn app(auth: bool) -> Router {
    api::router(AppState::new(service(auth)), None)
}

fn get(uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut b = Request::builder().method("GET").uri(uri);
    if let Some(v) = authorization {
        b = b.header(header::AUTHORIZATION, v);
    }
    b.body(Body::empty()).expect("build request")
}

fn basic(user: &str, pass: &str) -> String {
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"))
    )
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    String::from_utf8(bytes).expect("utf8")
}

#[tokio::test]
async fn health_is_open() {
    let resp = app(true).oneshot(get("/health", None)).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "ok");
}

#[tokio::test]
async fn scan_requires_basic_auth_when_configured() {
    let resp = app(true).oneshot(get("/scan", None)).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));

    let wrong = basic("ops", "nope");
    let resp = app(true)
        .oneshot(get("/scan", Some(&wrong)))
        .await
        .expect("oneshot");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let right = basic("ops", "hunter2");
    let resp = app(true)
        .oneshot(get("/scan", Some(&right)))
        .await
        .expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK);
    let v: Json = serde_json::from_str(&body_string(resp).await).expect("json");
    assert_eq!(v, Json::Array(vec![]));
}

#[tokio::test]
async fn scan_is_open_without_configured_auth() {
    let resp = app(false)
        .oneshot(get("/scan?filter=true", None))
        .await
        .expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_or_unconfigured_source_is_404() {
    let auth = basic("ops", "hunter2");

    let resp = app(true)
        .oneshot(get("/scan/myspace", Some(&auth)))
        .await
        .expect("oneshot");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let v: Json = serde_json::from_str(&body_string(resp).await).expect("json");
    assert!(v["error"].as_str().unwrap_or_default().contains("myspace"));

    // enabled in the keyword config, but no credentials
    let resp = app(true)
        .oneshot(get("/scan/reddit", Some(&auth)))
        .await
        .expect("oneshot");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_route_only_with_recorder() {
    let resp = app(false).oneshot(get("/metrics", None)).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let metrics = Metrics::init().expect("recorder");
    let with = api::router(AppState::new(service(false)), Some(&metrics));
    // one scan so the counters have a value
    let resp = with
        .clone()
        .oneshot(get("/scan", None))
        .await
        .expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = with.oneshot(get("/metrics", None)).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK);
    let text = body_string(resp).await;
    assert!(text.contains("scan_runs_total"), "{text}");
}
