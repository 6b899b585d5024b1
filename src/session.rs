// src/session.rs
//! Per-source authentication sessions that survive restarts.
//!
//! One store serves every source. Each source gets its own policy (max age
//! plus a random jitter resolved once when the source is first seen) and its
//! own read/write lock, so sources never contend with each other.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(3 * 24 * 3600);
pub const DEFAULT_SESSION_JITTER: Duration = Duration::from_secs(12 * 3600);

/// Opaque platform credential plus the time it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCredential {
    pub payload: serde_json::Value,
    pub refreshed_at: DateTime<Utc>,
}

impl SessionCredential {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            refreshed_at: Utc::now(),
        }
    }

    /// Convenience for the common bearer-token payload `{"token": ...}`.
    pub fn token(&self) -> Option<&str> {
        self.payload.get("token").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub max_age: Duration,
    pub jitter: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_SESSION_MAX_AGE,
            jitter: DEFAULT_SESSION_JITTER,
        }
    }
}

impl SessionPolicy {
    /// `max_age + uniform(0..=jitter)`.
    pub fn resolve(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis().min(u64::MAX as u128) as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.max_age.saturating_add(Duration::from_millis(extra))
    }
}

/// Raw storage for session records.
#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    async fn read(&self, source: &str) -> Result<Option<String>>;
    async fn write(&self, source: &str, record: &str) -> Result<()>;
    async fn remove(&self, source: &str) -> Result<()>;
}

/// One JSON file per source: `<dir>/<source>_session.json`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, source: &str) -> PathBuf {
        self.dir.join(format!("{source}_session.json"))
    }
}

#[async_trait::async_trait]
impl SessionBackend for FileBackend {
    async fn read(&self, source: &str) -> Result<Option<String>> {
        let path = self.path_for(source);
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn write(&self, source: &str, record: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.path_for(source);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, record.as_bytes())
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renaming into {}", path.display()))?;
        Ok(())
    }

    async fn remove(&self, source: &str) -> Result<()> {
        let path = self.path_for(source);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionBackend for MemoryBackend {
    async fn read(&self, source: &str) -> Result<Option<String>> {
        let g = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(g.get(source).cloned())
    }

    async fn write(&self, source: &str, record: &str) -> Result<()> {
        let mut g = self.records.lock().unwrap_or_else(|e| e.into_inner());
        g.insert(source.to_string(), record.to_string());
        Ok(())
    }

    async fn remove(&self, source: &str) -> Result<()> {
        let mut g = self.records.lock().unwrap_or_else(|e| e.into_inner());
        g.remove(source);
        Ok(())
    }
}

struct SourceSlot {
    max_age: Mutex<Duration>,
    lock: RwLock<()>,
}

impl SourceSlot {
    fn new(max_age: Duration) -> Self {
        Self {
            max_age: Mutex::new(max_age),
            lock: RwLock::new(()),
        }
    }

    fn max_age(&self) -> Duration {
        *self.max_age.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct SessionStore {
    backend: Box<dyn SessionBackend>,
    default_policy: SessionPolicy,
    slots: Mutex<HashMap<String, Arc<SourceSlot>>>,
}

impl SessionStore {
    pub fn new(backend: impl SessionBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            default_policy: SessionPolicy::default(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn file(dir: impl Into<PathBuf>) -> Self {
        Self::new(FileBackend::new(dir))
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Policy used for sources that were never registered explicitly.
    pub fn with_default_policy(mut self, policy: SessionPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Resolve and pin the effective max age for `source`. Re-registering
    /// replaces the age but keeps the slot, so in-flight readers and writers
    /// stay serialized against later ones.
    pub fn register(&self, source: &str, policy: SessionPolicy) -> Duration {
        let max_age = policy.resolve();
        let slot = self.slot(source);
        *slot.max_age.lock().unwrap_or_else(|e| e.into_inner()) = max_age;
        max_age
    }

    fn slot(&self, source: &str) -> Arc<SourceSlot> {
        let mut g = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        g.entry(source.to_string())
            .or_insert_with(|| Arc::new(SourceSlot::new(self.default_policy.resolve())))
            .clone()
    }

    pub fn effective_max_age(&self, source: &str) -> Duration {
        self.slot(source).max_age()
    }

    pub async fn load(&self, source: &str) -> Option<SessionCredential> {
        self.load_at(source, Utc::now()).await
    }

    /// [`load`](Self::load) against an explicit clock.
    pub async fn load_at(&self, source: &str, now: DateTime<Utc>) -> Option<SessionCredential> {
        let slot = self.slot(source);
        let _guard = slot.lock.read().await;

        let raw = match self.backend.read(source).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(target: "session", source, error = ?e, "session read failed");
                return None;
            }
        };

        let cred: SessionCredential = match serde_json::from_str(&raw) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(target: "session", source, error = %e, "session record undecodable");
                return None;
            }
        };

        let age = now.signed_duration_since(cred.refreshed_at);
        let max_age = chrono::Duration::from_std(slot.max_age()).unwrap_or(chrono::Duration::MAX);
        if age > max_age {
            tracing::debug!(target: "session", source, age_secs = age.num_seconds(), "session expired");
            return None;
        }
        Some(cred)
    }

    pub async fn save(&self, source: &str, cred: &SessionCredential) -> Result<()> {
        let slot = self.slot(source);
        let _guard = slot.lock.write().await;
        let record = serde_json::to_string(cred).context("encoding session")?;
        self.backend.write(source, &record).await?;
        tracing::debug!(target: "session", source, "session saved");
        Ok(())
    }

    pub async fn invalidate(&self, source: &str) -> Result<()> {
        let slot = self.slot(source);
        let _guard = slot.lock.write().await;
        self.backend.remove(source).await?;
        tracing::debug!(target: "session", source, "session invalidated");
        Ok(())
    }
}
