// src/model.rs
//! Canonical, source-agnostic data produced by a scan.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The content platforms this listener knows how to scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Reddit,
    Twitter,
    Bluesky,
    #[serde(rename = "youtube")]
    YouTube,
    Instagram,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Reddit,
        SourceKind::Twitter,
        SourceKind::Bluesky,
        SourceKind::YouTube,
        SourceKind::Instagram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Reddit => "reddit",
            SourceKind::Twitter => "twitter",
            SourceKind::Bluesky => "bluesky",
            SourceKind::YouTube => "youtube",
            SourceKind::Instagram => "instagram",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reddit" => Ok(SourceKind::Reddit),
            "twitter" | "x" => Ok(SourceKind::Twitter),
            "bluesky" | "bsky" => Ok(SourceKind::Bluesky),
            "youtube" => Ok(SourceKind::YouTube),
            "instagram" => Ok(SourceKind::Instagram),
            other => anyhow::bail!("unknown source `{other}`"),
        }
    }
}

/// Platform-specific fields carried alongside the canonical ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDetails {
    Reddit {
        subreddit: String,
        score: i64,
        num_comments: u64,
    },
    Twitter {
        community: String,
        likes: u64,
        retweets: u64,
    },
    Bluesky {
        feed: String,
        likes: u64,
        reposts: u64,
    },
    #[serde(rename = "youtube")]
    YouTube { video_id: String, likes: u64 },
    Instagram { media_code: String, likes: u64 },
}

/// A matched item, normalized. Built by the adapter after the cutoff check
/// and a positive match; treated as read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPost {
    pub source: SourceKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub author: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub matched_term: String,
    pub details: SourceDetails,
}

impl CanonicalPost {
    /// Short single-line preview of the content, used by notifiers.
    pub fn preview(&self, max_chars: usize) -> String {
        let flat: String = self.content.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() > max_chars {
            let mut out: String = flat.chars().take(max_chars).collect();
            out.push_str("...");
            out
        } else {
            flat
        }
    }
}

/// Lookback window of one adapter fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub cutoff: DateTime<Utc>,
}

impl ScanWindow {
    pub fn new(cutoff: DateTime<Utc>) -> Self {
        Self { cutoff }
    }

    /// Window covering `interval` back from `now`.
    pub fn ending_at(now: DateTime<Utc>, interval: Duration) -> Self {
        let lookback = ChronoDuration::from_std(interval).unwrap_or(ChronoDuration::MAX);
        let cutoff = now
            .checked_sub_signed(lookback)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { cutoff }
    }

    /// Window computed against the wall clock at call time.
    pub fn ending_now(interval: Duration) -> Self {
        Self::ending_at(Utc::now(), interval)
    }

    pub fn admits(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.cutoff
    }
}
