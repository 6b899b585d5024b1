// tests/common/mod.rs
//
// Scripted in-memory platform client shared by the integration tests.
// Call keys:
//   "login", "restore", "streams:<sub_target>", "page:<stream_id>:<cursor or ->"
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use social_listener::config::SourceConfig;
use social_listener::error::{Result, ScanError};
use social_listener::matcher::MatcherChain;
use social_listener::model::{SourceDetails, SourceKind};
use social_listener::pacing::NoPacing;
use social_listener::retry::RetryPolicy;
use social_listener::session::{SessionCredential, SessionStore};
use social_listener::sources::{Page, RawItem, ScanAdapter, SourceApi, Stream};

pub fn page_key(stream: &str, cursor: Option<&str>) -> String {
    format!("page:{stream}:{}", cursor.unwrap_or("-"))
}

pub fn item(id: &str, text: &str, created_at: DateTime<Utc>) -> RawItem {
    RawItem {
        id: id.to_string(),
        title: None,
        body: text.to_string(),
        author: "someone".to_string(),
        url: format!("https://example.test/{id}"),
        created_at,
        details: SourceDetails::Reddit {
            subreddit: "test".to_string(),
            score: 1,
            num_comments: 0,
        },
    }
}

pub fn page(items: Vec<RawItem>, next: Option<&str>) -> Page {
    Page {
        items,
        next: next.map(str::to_string),
    }
}

/// Observations shared with the test after the adapter took ownership of the fake.
#[derive(Clone, Default)]
pub struct Probe {
    pub logins: Arc<AtomicUsize>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, key: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == key).count()
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }
}

pub struct FakeApi {
    kind: SourceKind,
    persists: bool,
    streams: HashMap<String, Vec<Stream>>,
    pages: HashMap<String, Page>,
    errors: HashMap<String, VecDeque<ScanError>>,
    reject_restore: bool,
    cancel_on: Option<(String, CancellationToken)>,
    token: Option<String>,
    pub probe: Probe,
}

impl FakeApi {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            persists: true,
            streams: HashMap::new(),
            pages: HashMap::new(),
            errors: HashMap::new(),
            reject_restore: false,
            cancel_on: None,
            token: None,
            probe: Probe::default(),
        }
    }

    /// Without explicit streams a sub-target is a single stream with the same id.
    pub fn with_streams(mut self, sub_target: &str, ids: &[&str]) -> Self {
        self.streams.insert(
            sub_target.to_string(),
            ids.iter().map(|id| Stream::new(sub_target, *id)).collect(),
        );
        self
    }

    pub fn with_page(mut self, stream: &str, cursor: Option<&str>, page: Page) -> Self {
        self.pages.insert(page_key(stream, cursor), page);
        self
    }

    /// Queue errors returned (in order) before the call at `key` succeeds.
    pub fn failing(mut self, key: &str, errs: Vec<ScanError>) -> Self {
        self.errors.entry(key.to_string()).or_default().extend(errs);
        self
    }

    pub fn rejecting_restore(mut self) -> Self {
        self.reject_restore = true;
        self
    }

    pub fn without_session(mut self) -> Self {
        self.persists = false;
        self
    }

    /// Cancel `token` as soon as the call at `key` is made.
    pub fn cancelling_on(mut self, key: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((key.to_string(), token));
        self
    }

    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }

    fn record(&mut self, key: &str) -> Result<()> {
        self.probe.calls.lock().unwrap().push(key.to_string());
        if let Some((k, token)) = &self.cancel_on {
            if k == key {
                token.cancel();
            }
        }
        match self.errors.get_mut(key).and_then(VecDeque::pop_front) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SourceApi for FakeApi {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn persists_session(&self) -> bool {
        self.persists
    }

    async fn login(&mut self) -> Result<SessionCredential> {
        self.record("login")?;
        let n = self.probe.logins.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("tok-{n}");
        self.token = Some(token.clone());
        Ok(SessionCredential::new(json!({ "token": token })))
    }

    async fn restore(&mut self, cred: &SessionCredential) -> Result<()> {
        self.record("restore")?;
        if self.reject_restore {
            return Err(ScanError::AuthenticationExpired);
        }
        self.token = cred.token().map(str::to_string);
        Ok(())
    }

    async fn streams(&mut self, sub_target: &str) -> Result<Vec<Stream>> {
        self.record(&format!("streams:{sub_target}"))?;
        Ok(self
            .streams
            .get(sub_target)
            .cloned()
            .unwrap_or_else(|| vec![Stream::new(sub_target, sub_target)]))
    }

    async fn fetch_page(&mut self, stream: &Stream, cursor: Option<&str>) -> Result<Page> {
        let key = page_key(&stream.id, cursor);
        self.record(&key)?;
        if self.token.is_none() && self.persists {
            return Err(ScanError::AuthenticationExpired);
        }
        Ok(self.pages.get(&key).cloned().unwrap_or_default())
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(1), 3)
}

/// Adapter over `api` with no pacing, a millisecond retry base and the
/// given session store.
pub fn adapter(
    api: FakeApi,
    cfg: &SourceConfig,
    sessions: Arc<SessionStore>,
) -> ScanAdapter<FakeApi> {
    ScanAdapter::new(
        api,
        Arc::new(MatcherChain::from_config(cfg)),
        cfg,
        sessions,
        fast_retry(),
        Arc::new(NoPacing),
    )
}
