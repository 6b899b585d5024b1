// src/error.rs
//! Error taxonomy for the scan core.
//!
//! Adapters translate every upstream failure into a [`ScanError`]; the retry
//! policy classifies it and the adapter's pagination loop decides whether to
//! retry, re-authenticate, skip the unit of work or give up on the source.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Debug, Clone, Error)]
pub enum ScanError {
    /// Upstream rejected an otherwise valid request because the session expired.
    #[error("authentication expired")]
    AuthenticationExpired,

    /// Bad credentials or a login the platform will not accept; never retried.
    #[error("authentication failed: {0}")]
    AuthenticationFatal(String),

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Platform-side anti-automation block (checkpoint, challenge, 403).
    #[error("blocked by platform: {0}")]
    Blocked(String),

    #[error("network error: {0}")]
    NetworkTransient(String),

    #[error("malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// Malformed request or unexpected client error.
    #[error("fatal upstream error: {0}")]
    Fatal(String),

    /// The platform reports nothing to fetch for this unit (e.g. comments disabled).
    #[error("skipped: {0}")]
    Skipped(String),

    #[error("scan cancelled")]
    Cancelled,

    #[error("secondary filter failed: {0}")]
    SecondaryFilter(String),

    #[error("all {} sources failed", failures.len())]
    AllSourcesFailed { failures: Vec<SourceFailure> },
}

/// One source that did not contribute to a scan, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

impl ScanError {
    /// Map an HTTP status (plus body for diagnostics) onto the taxonomy.
    ///
    /// Platform clients refine this with their own error payloads before
    /// falling back here.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let snippet: String = body.chars().take(200).collect();
        match status {
            401 => ScanError::AuthenticationExpired,
            403 => ScanError::Blocked(snippet),
            429 => ScanError::RateLimited { retry_after },
            500..=599 => ScanError::NetworkTransient(format!("status {status}: {snippet}")),
            _ => ScanError::Fatal(format!("status {status}: {snippet}")),
        }
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ScanError::AuthenticationExpired)
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ScanError::MalformedUpstreamResponse(err.to_string())
        } else if let Some(status) = err.status() {
            ScanError::from_status(status.as_u16(), &err.to_string(), None)
        } else {
            // connect, timeout, body and redirect errors
            ScanError::NetworkTransient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::MalformedUpstreamResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_taxonomy() {
        assert!(ScanError::from_status(401, "", None).is_auth_expired());
        assert!(matches!(
            ScanError::from_status(403, "checkpoint_required", None),
            ScanError::Blocked(_)
        ));
        assert!(matches!(
            ScanError::from_status(429, "", Some(Duration::from_secs(7))),
            ScanError::RateLimited {
                retry_after: Some(d)
            } if d == Duration::from_secs(7)
        ));
        assert!(matches!(
            ScanError::from_status(503, "", None),
            ScanError::NetworkTransient(_)
        ));
        assert!(matches!(
            ScanError::from_status(400, "bad request", None),
            ScanError::Fatal(_)
        ));
    }

    #[test]
    fn all_sources_failed_message_counts() {
        let e = ScanError::AllSourcesFailed {
            failures: vec![
                SourceFailure {
                    source: "reddit".into(),
                    error: "x".into(),
                },
                SourceFailure {
                    source: "bluesky".into(),
                    error: "y".into(),
                },
            ],
        };
        assert_eq!(e.to_string(), "all 2 sources failed");
    }
}
