// src/api.rs
//! HTTP trigger surface: `/health`, `/scan`, `/scan/{source}` and (when a
//! recorder is installed) `/metrics`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::config::settings::BasicAuth;
use crate::error::ScanError;
use crate::metrics::Metrics;
use crate::model::SourceKind;
use crate::orchestrator::ScanService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ScanService>,
    pub auth: Option<Arc<BasicAuth>>,
}

impl AppState {
    pub fn new(service: Arc<ScanService>) -> Self {
        let auth = service.settings().api_auth.clone().map(Arc::new);
        Self { service, auth }
    }
}

pub fn router(state: AppState, metrics: Option<&Metrics>) -> Router {
    let protected = Router::new()
        .route("/scan", get(scan_all))
        .route("/scan/{source}", get(scan_source))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_basic_auth))
        .with_state(state);

    let mut app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(protected);
    if let Some(m) = metrics {
        app = app.merge(m.router());
    }
    app.layer(CorsLayer::very_permissive())
}

/// `Authorization: Basic base64(user:pass)` must match when auth is configured.
fn credentials_match(header_value: Option<&str>, expected: &BasicAuth) -> bool {
    let Some(encoded) = header_value.and_then(|v| v.strip_prefix("Basic ")) else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(pair) = String::from_utf8(decoded) else {
        return false;
    };
    match pair.split_once(':') {
        Some((user, pass)) => user == expected.username && pass == expected.password,
        None => false,
    }
}

async fn require_basic_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(expected) = &state.auth {
        let given = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if !credentials_match(given, expected) {
            return (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"social-listener\"")],
                "unauthorized",
            )
                .into_response();
        }
    }
    next.run(req).await
}

#[derive(Debug, Default, Deserialize)]
struct ScanQuery {
    #[serde(default)]
    filter: bool,
}

enum ApiError {
    NotFound(String),
    Scan(ScanError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))).into_response(),
            ApiError::Scan(ScanError::AllSourcesFailed { failures }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "all sources failed", "failures": failures })),
            )
                .into_response(),
            ApiError::Scan(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response(),
        }
    }
}

async fn scan_all(
    State(state): State<AppState>,
    Query(q): Query<ScanQuery>,
) -> Result<Response, ApiError> {
    let report = state.service.scan(None, q.filter).await.map_err(ApiError::Scan)?;
    Ok(Json(report.posts).into_response())
}

async fn scan_source(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Query(q): Query<ScanQuery>,
) -> Result<Response, ApiError> {
    let kind: SourceKind = source
        .parse()
        .map_err(|_| ApiError::NotFound(format!("unknown source `{source}`")))?;
    if !state.service.is_configured(kind) {
        return Err(ApiError::NotFound(format!("source `{kind}` is not configured")));
    }
    let report = state
        .service
        .scan(Some(kind), q.filter)
        .await
        .map_err(ApiError::Scan)?;
    Ok(Json(report.posts).into_response())
}
