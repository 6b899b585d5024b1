// src/sources/mod.rs
//! Source adapters: the capability contract the orchestrator drives, the
//! generic engine that implements it once, and the platform clients.

pub mod adapter;
pub mod bluesky;
pub mod http;
pub mod instagram;
pub mod reddit;
pub mod twitter;
pub mod youtube;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::{KeywordConfig, PacingMode, Settings, SourceConfig};
use crate::error::Result;
use crate::matcher::semantic::{Embedder, SemanticStage};
use crate::matcher::MatcherChain;
use crate::model::{CanonicalPost, ScanWindow, SourceDetails, SourceKind};
use crate::pacing::{JitteredPacer, NoPacing, Pacer};
use crate::retry::RetryPolicy;
use crate::session::{SessionCredential, SessionStore};

pub use adapter::ScanAdapter;

/// Lifecycle of one adapter within a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Uninitialized,
    Authenticating,
    Ready,
    Fetching,
    Reauthenticating,
    Done,
    FailedFatal,
    Closed,
}

/// What the orchestrator sees of a source.
#[async_trait]
pub trait SourceAdapter: Send {
    fn kind(&self) -> SourceKind;

    fn state(&self) -> AdapterState;

    /// Establish an authenticated session, restoring a stored one when fresh.
    async fn initialize(&mut self, cancel: &CancellationToken) -> Result<()>;

    /// Matching items created at or after `window.cutoff`, across all
    /// configured sub-targets.
    async fn fetch_since(
        &mut self,
        window: &ScanWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<CanonicalPost>>;

    /// Release resources. Idempotent; never fails.
    async fn close(&mut self);
}

/// A paginated list inside a sub-target (a listing, a feed, one video's
/// comments, one reel's comments).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub sub_target: String,
    pub id: String,
    /// Platform-specific extra (video title, media shortcode).
    pub label: Option<String>,
}

impl Stream {
    pub fn new(sub_target: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            sub_target: sub_target.into(),
            id: id.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// One upstream item before the cutoff check and matching.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub id: String,
    pub title: Option<String>,
    pub body: String,
    pub author: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub details: SourceDetails,
}

impl RawItem {
    /// Text fed to the matcher: title and body joined when both exist.
    pub fn match_text(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() && !self.body.trim().is_empty() => {
                format!("{t} {}", self.body)
            }
            Some(t) if !t.is_empty() => t.to_string(),
            _ => self.body.clone(),
        }
    }

    pub fn into_post(self, source: SourceKind, matched_term: &str) -> CanonicalPost {
        CanonicalPost {
            source,
            content: self.body,
            title: self.title,
            author: self.author,
            url: self.url,
            created_at: self.created_at,
            matched_term: matched_term.to_string(),
            details: self.details,
        }
    }
}

/// One page of a stream, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<RawItem>,
    pub next: Option<String>,
}

/// Per-platform capabilities the generic engine is built from.
///
/// Every method maps upstream failures onto [`crate::error::ScanError`];
/// an expired session must surface as `AuthenticationExpired` so the
/// engine can re-authenticate.
#[async_trait]
pub trait SourceApi: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// `false` for API-key platforms that have nothing worth storing.
    fn persists_session(&self) -> bool {
        true
    }

    /// Fresh authentication. Installs the new credential and returns it for
    /// persistence.
    async fn login(&mut self) -> Result<SessionCredential>;

    /// Install a stored credential.
    async fn restore(&mut self, cred: &SessionCredential) -> Result<()>;

    async fn streams(&mut self, sub_target: &str) -> Result<Vec<Stream>>;

    async fn fetch_page(&mut self, stream: &Stream, cursor: Option<&str>) -> Result<Page>;

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Shared collaborators every adapter is built with.
#[derive(Clone)]
pub struct AdapterDeps {
    pub sessions: Arc<SessionStore>,
    pub retry: RetryPolicy,
    pub embedder: Option<Arc<dyn Embedder>>,
}

/// Matcher for one source, with the semantic stage when configured and an
/// embedder is available.
pub fn build_matcher(cfg: &SourceConfig, embedder: Option<&Arc<dyn Embedder>>) -> MatcherChain {
    let chain = MatcherChain::from_config(cfg);
    match (cfg.semantic, embedder) {
        (Some(sem), Some(e)) => chain.with_semantic(SemanticStage::new(
            e.clone(),
            cfg.keywords.clone(),
            sem.threshold,
        )),
        (Some(_), None) => {
            tracing::warn!(target: "scan", source = %cfg.kind, "semantic matching configured but no embedder; lexical only");
            chain
        }
        _ => chain,
    }
}

fn pacer_for(cfg: &SourceConfig) -> Arc<dyn Pacer> {
    match (cfg.pacing, cfg.kind) {
        (PacingMode::None, _) => Arc::new(NoPacing),
        (PacingMode::Jittered, SourceKind::YouTube | SourceKind::Instagram) => {
            Arc::new(JitteredPacer::comments())
        }
        (PacingMode::Jittered, _) => Arc::new(JitteredPacer::default()),
    }
}

/// Wrap a platform client into a ready-to-run adapter.
pub fn adapter_for<A>(api: A, cfg: &SourceConfig, deps: &AdapterDeps) -> Box<dyn SourceAdapter>
where
    A: SourceApi + 'static,
{
    Box::new(ScanAdapter::new(
        api,
        Arc::new(build_matcher(cfg, deps.embedder.as_ref())),
        cfg,
        deps.sessions.clone(),
        deps.retry,
        pacer_for(cfg),
    ))
}

/// Build one adapter per requested source. Sources that are disabled, not
/// configured or missing credentials are left out with a warning.
pub fn build_adapters(
    settings: &Settings,
    keywords: &KeywordConfig,
    deps: &AdapterDeps,
    only: Option<SourceKind>,
) -> anyhow::Result<Vec<Box<dyn SourceAdapter>>> {
    let mut out: Vec<Box<dyn SourceAdapter>> = Vec::new();

    for cfg in keywords.enabled() {
        if only.is_some_and(|k| k != cfg.kind) {
            continue;
        }
        let adapter = match cfg.kind {
            SourceKind::Reddit => settings
                .reddit
                .as_ref()
                .map(|c| reddit::RedditApi::new(c.clone()))
                .transpose()?
                .map(|api| adapter_for(api, cfg, deps)),
            SourceKind::Twitter => settings
                .twitter
                .as_ref()
                .map(|c| twitter::TwitterApi::new(c.clone()))
                .transpose()?
                .map(|api| adapter_for(api, cfg, deps)),
            SourceKind::Bluesky => settings
                .bluesky
                .as_ref()
                .map(|c| bluesky::BlueskyApi::new(c.clone()))
                .transpose()?
                .map(|api| adapter_for(api, cfg, deps)),
            SourceKind::YouTube => settings
                .youtube_api_key
                .as_ref()
                .map(|k| youtube::YouTubeApi::new(k.clone()))
                .transpose()?
                .map(|api| adapter_for(api, cfg, deps)),
            SourceKind::Instagram => settings
                .instagram
                .as_ref()
                .map(|c| instagram::InstagramApi::new(c.clone()))
                .transpose()?
                .map(|api| adapter_for(api, cfg, deps)),
        };
        match adapter {
            Some(a) => out.push(a),
            None => {
                tracing::warn!(target: "scan", source = %cfg.kind, "no credentials configured; source skipped")
            }
        }
    }
    Ok(out)
}
