// src/sources/adapter.rs
//! The generic scan engine: one implementation of session handling,
//! retry/backoff, re-authentication, pagination, cutoff and pacing, shared by
//! every platform client.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;

use super::{AdapterState, Page, SourceAdapter, SourceApi, Stream};
use crate::config::SourceConfig;
use crate::error::{Result, ScanError};
use crate::matcher::MatcherChain;
use crate::model::{CanonicalPost, ScanWindow, SourceKind};
use crate::pacing::{sleep_or_cancel, Pacer, Phase};
use crate::retry::{classify, RetryPolicy};
use crate::session::{SessionCredential, SessionStore};
use crate::text::anon_hash;

/// Re-authentications allowed within one `fetch_since`.
pub const MAX_REAUTH_PER_FETCH: u32 = 2;

/// Result of one resilient upstream call.
#[derive(Debug)]
enum Step<T> {
    Ok(T),
    /// Give up on this unit of work, carry on with the next one.
    Skip(ScanError),
    /// The source cannot continue.
    Abort(ScanError),
    Cancelled,
}

enum Call {
    Streams(String),
    Page {
        stream: Stream,
        cursor: Option<String>,
    },
}

enum Reply {
    Streams(Vec<Stream>),
    Page(Page),
}

async fn dispatch<A: SourceApi>(api: &mut A, call: &Call) -> Result<Reply> {
    match call {
        Call::Streams(target) => api.streams(target).await.map(Reply::Streams),
        Call::Page { stream, cursor } => api
            .fetch_page(stream, cursor.as_deref())
            .await
            .map(Reply::Page),
    }
}

enum TargetOutcome {
    Completed(Vec<CanonicalPost>),
    Cancelled,
    Aborted(Vec<CanonicalPost>, ScanError),
}

pub struct ScanAdapter<A: SourceApi> {
    api: A,
    matcher: Arc<MatcherChain>,
    targets: Vec<String>,
    shuffle: bool,
    max_pages: usize,
    sessions: Arc<SessionStore>,
    retry: RetryPolicy,
    pacer: Arc<dyn Pacer>,
    state: AdapterState,
}

impl<A: SourceApi> ScanAdapter<A> {
    pub fn new(
        api: A,
        matcher: Arc<MatcherChain>,
        cfg: &SourceConfig,
        sessions: Arc<SessionStore>,
        retry: RetryPolicy,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        Self {
            api,
            matcher,
            targets: cfg.sub_targets.clone(),
            shuffle: cfg.shuffle,
            max_pages: cfg.max_pages.max(1),
            sessions,
            retry,
            pacer,
            state: AdapterState::Uninitialized,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn source(&self) -> &'static str {
        self.api.kind().as_str()
    }

    async fn pace(&self, phase: Phase, cancel: &CancellationToken) -> bool {
        sleep_or_cancel(self.pacer.delay(phase), cancel).await
    }

    /// Fresh login under the retry policy. Persists the new credential.
    async fn login_with_retry(&mut self, cancel: &CancellationToken) -> Result<()> {
        let source = self.source();
        let mut backoff = self.retry.backoff();
        let cred: SessionCredential = loop {
            let res = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ScanError::Cancelled),
                r = self.api.login() => r,
            };
            match res {
                Ok(c) => break c,
                Err(e @ (ScanError::AuthenticationFatal(_) | ScanError::Cancelled)) => return Err(e),
                Err(e) => {
                    if !classify(&e).is_retryable() {
                        return Err(e);
                    }
                    let Some(delay) = backoff.next_delay_for(&e) else {
                        tracing::warn!(target: "scan", source, error = %e, "login retries exhausted");
                        return Err(e);
                    };
                    counter!("scan_retries_total", "source" => source).increment(1);
                    tracing::warn!(
                        target: "scan",
                        source,
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "login failed, backing off"
                    );
                    if !sleep_or_cancel(delay, cancel).await {
                        return Err(ScanError::Cancelled);
                    }
                }
            }
        };

        if self.api.persists_session() {
            if let Err(e) = self.sessions.save(source, &cred).await {
                tracing::warn!(target: "scan", source, error = ?e, "could not persist session");
            }
        }
        Ok(())
    }

    async fn reauthenticate(&mut self, cancel: &CancellationToken) -> Result<()> {
        let source = self.source();
        self.state = AdapterState::Reauthenticating;
        counter!("scan_reauth_total", "source" => source).increment(1);
        tracing::info!(target: "scan", source, "session expired, re-authenticating");
        if self.api.persists_session() {
            if let Err(e) = self.sessions.invalidate(source).await {
                tracing::warn!(target: "scan", source, error = ?e, "could not invalidate session");
            }
        }
        self.login_with_retry(cancel).await?;
        self.state = AdapterState::Fetching;
        Ok(())
    }

    /// One upstream call with retry, backoff and re-authentication.
    async fn attempt(
        &mut self,
        call: &Call,
        cancel: &CancellationToken,
        reauths: &mut u32,
    ) -> Step<Reply> {
        let source = self.source();
        let mut backoff = self.retry.backoff();
        loop {
            let res = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Step::Cancelled,
                r = dispatch(&mut self.api, call) => r,
            };
            let err = match res {
                Ok(reply) => return Step::Ok(reply),
                Err(e) => e,
            };
            match err {
                ScanError::Cancelled => return Step::Cancelled,
                ScanError::AuthenticationExpired => {
                    if *reauths >= MAX_REAUTH_PER_FETCH {
                        return Step::Abort(ScanError::AuthenticationFatal(
                            "session keeps expiring after re-authentication".into(),
                        ));
                    }
                    *reauths += 1;
                    match self.reauthenticate(cancel).await {
                        Ok(()) => continue,
                        Err(ScanError::Cancelled) => return Step::Cancelled,
                        Err(e) => return Step::Abort(e),
                    }
                }
                e @ ScanError::AuthenticationFatal(_) => return Step::Abort(e),
                e @ (ScanError::Skipped(_) | ScanError::MalformedUpstreamResponse(_)) => {
                    return Step::Skip(e)
                }
                e => {
                    let class = classify(&e);
                    if !class.is_retryable() {
                        return Step::Skip(e);
                    }
                    let Some(delay) = backoff.next_delay_for(&e) else {
                        return Step::Skip(e);
                    };
                    counter!("scan_retries_total", "source" => source).increment(1);
                    tracing::warn!(
                        target: "scan",
                        source,
                        class = class.as_str(),
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "upstream call failed, backing off"
                    );
                    if !sleep_or_cancel(delay, cancel).await {
                        return Step::Cancelled;
                    }
                }
            }
        }
    }

    fn note_skip(&self, target: &str, what: &str, err: &ScanError) {
        let source = self.source();
        counter!("scan_subtarget_skips_total", "source" => source).increment(1);
        tracing::warn!(target: "scan", source, sub_target = target, what, error = %err, "skipping");
    }

    async fn scan_target(
        &mut self,
        target: &str,
        window: &ScanWindow,
        cancel: &CancellationToken,
        reauths: &mut u32,
        seen: &mut HashSet<String>,
    ) -> TargetOutcome {
        let kind = self.api.kind();
        let source = kind.as_str();

        let streams = match self
            .attempt(&Call::Streams(target.to_string()), cancel, reauths)
            .await
        {
            Step::Ok(Reply::Streams(s)) => s,
            Step::Ok(Reply::Page(_)) => {
                let e = ScanError::MalformedUpstreamResponse("page returned for stream listing".into());
                self.note_skip(target, "streams", &e);
                return TargetOutcome::Completed(Vec::new());
            }
            Step::Skip(e) => {
                self.note_skip(target, "streams", &e);
                return TargetOutcome::Completed(Vec::new());
            }
            Step::Abort(e) => return TargetOutcome::Aborted(Vec::new(), e),
            Step::Cancelled => return TargetOutcome::Cancelled,
        };

        let mut posts = Vec::new();
        for (si, stream) in streams.iter().enumerate() {
            if si > 0 && !self.pace(Phase::Stream, cancel).await {
                return TargetOutcome::Cancelled;
            }

            let mut cursor: Option<String> = None;
            for page_no in 0..self.max_pages {
                if page_no > 0 && !self.pace(Phase::Page, cancel).await {
                    return TargetOutcome::Cancelled;
                }
                let call = Call::Page {
                    stream: stream.clone(),
                    cursor: cursor.clone(),
                };
                let page = match self.attempt(&call, cancel, reauths).await {
                    Step::Ok(Reply::Page(p)) => p,
                    Step::Ok(Reply::Streams(_)) => {
                        let e = ScanError::MalformedUpstreamResponse("stream listing returned for page".into());
                        self.note_skip(target, "page", &e);
                        break;
                    }
                    Step::Skip(e) => {
                        self.note_skip(target, "page", &e);
                        break;
                    }
                    Step::Abort(e) => return TargetOutcome::Aborted(posts, e),
                    Step::Cancelled => return TargetOutcome::Cancelled,
                };

                let mut breached = false;
                for item in page.items {
                    counter!("scan_items_checked_total", "source" => source).increment(1);
                    if !window.admits(item.created_at) {
                        breached = true;
                        continue;
                    }
                    // Listings shift while paging; the same item can show up twice.
                    if !seen.insert(item.id.clone()) {
                        continue;
                    }
                    let text = item.match_text();
                    let m = self.matcher.evaluate(&text).await;
                    tracing::debug!(
                        target: "scan",
                        source,
                        sub_target = target,
                        text_hash = %anon_hash(&text),
                        matched = m.matched(),
                        "item checked"
                    );
                    if m.matched() {
                        posts.push(item.into_post(kind, m.term()));
                    }
                    if !self.pace(Phase::Item, cancel).await {
                        return TargetOutcome::Cancelled;
                    }
                }

                if breached {
                    break;
                }
                match page.next {
                    Some(next) if !next.is_empty() => cursor = Some(next),
                    _ => break,
                }
            }
        }
        TargetOutcome::Completed(posts)
    }
}

#[async_trait]
impl<A: SourceApi + 'static> SourceAdapter for ScanAdapter<A> {
    fn kind(&self) -> SourceKind {
        self.api.kind()
    }

    fn state(&self) -> AdapterState {
        self.state
    }

    async fn initialize(&mut self, cancel: &CancellationToken) -> Result<()> {
        match self.state {
            AdapterState::Ready => return Ok(()),
            AdapterState::Closed => return Err(ScanError::Fatal("adapter already closed".into())),
            _ => {}
        }
        let source = self.source();
        self.state = AdapterState::Authenticating;

        if self.api.persists_session() {
            if let Some(cred) = self.sessions.load(source).await {
                match self.api.restore(&cred).await {
                    Ok(()) => {
                        tracing::info!(target: "scan", source, "session restored");
                        self.state = AdapterState::Ready;
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::info!(target: "scan", source, error = %e, "stored session rejected");
                        if let Err(e) = self.sessions.invalidate(source).await {
                            tracing::warn!(target: "scan", source, error = ?e, "could not invalidate session");
                        }
                    }
                }
            }
        }

        match self.login_with_retry(cancel).await {
            Ok(()) => {
                tracing::info!(target: "scan", source, "logged in");
                self.state = AdapterState::Ready;
                Ok(())
            }
            Err(ScanError::Cancelled) => {
                self.state = AdapterState::Uninitialized;
                Err(ScanError::Cancelled)
            }
            Err(e) => {
                tracing::error!(target: "scan", source, error = %e, "authentication failed");
                self.state = AdapterState::FailedFatal;
                Err(e)
            }
        }
    }

    async fn fetch_since(
        &mut self,
        window: &ScanWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<CanonicalPost>> {
        match self.state {
            AdapterState::Ready | AdapterState::Done => {}
            AdapterState::Uninitialized => self.initialize(cancel).await?,
            other => {
                return Err(ScanError::Fatal(format!(
                    "cannot fetch in state {other:?}"
                )))
            }
        }
        let source = self.source();
        self.state = AdapterState::Fetching;

        let mut targets = self.targets.clone();
        if self.shuffle {
            targets.shuffle(&mut rand::rng());
        }

        let mut out = Vec::new();
        let mut reauths = 0u32;
        let mut seen = HashSet::new();
        for (i, target) in targets.iter().enumerate() {
            if i > 0 && !self.pace(Phase::SubTarget, cancel).await {
                tracing::info!(target: "scan", source, kept = out.len(), "cancelled between sub-targets");
                break;
            }
            match self
                .scan_target(target, window, cancel, &mut reauths, &mut seen)
                .await {
                TargetOutcome::Completed(posts) => {
                    tracing::info!(target: "scan", source, sub_target = %target, matched = posts.len(), "sub-target done");
                    out.extend(posts);
                }
                TargetOutcome::Cancelled => {
                    tracing::info!(target: "scan", source, sub_target = %target, kept = out.len(), "cancelled; in-flight sub-target dropped");
                    break;
                }
                TargetOutcome::Aborted(partial, e) => {
                    tracing::error!(target: "scan", source, sub_target = %target, error = %e, "source aborted");
                    self.state = AdapterState::FailedFatal;
                    out.extend(partial);
                    if out.is_empty() {
                        return Err(e);
                    }
                    return Ok(out);
                }
            }
        }

        self.state = AdapterState::Done;
        Ok(out)
    }

    async fn close(&mut self) {
        if self.state == AdapterState::Closed {
            return;
        }
        if let Err(e) = self.api.close().await {
            tracing::warn!(target: "scan", source = self.source(), error = %e, "close failed");
        }
        self.state = AdapterState::Closed;
    }
}
