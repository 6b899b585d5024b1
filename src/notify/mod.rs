// src/notify/mod.rs
//! Downstream delivery of matched posts. Best effort: the orchestrator logs
//! notifier failures and never retries them.

pub mod email;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::CanonicalPost;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, posts: &[CanonicalPost]) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Logs a one-line summary per post. Used when email is not configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, posts: &[CanonicalPost]) -> Result<()> {
        for p in posts {
            tracing::info!(
                target: "notify",
                source = %p.source,
                author = %p.author,
                term = %p.matched_term,
                url = %p.url,
                "match"
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
