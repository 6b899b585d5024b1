// src/config/settings.rs
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::model::SourceKind;
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BASE};

pub const DEFAULT_SCAN_INTERVAL_MINUTES: u64 = 60;
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 900;
pub const DEFAULT_SESSION_DIR: &str = "state/sessions";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitterCredentials {
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlueskyCredentials {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstagramCredentials {
    pub access_token: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

/// Everything the service reads from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Settings {
    pub scan_interval: Duration,
    pub scan_timeout: Duration,
    pub keywords_path: Option<PathBuf>,
    pub session_dir: PathBuf,
    pub retry: RetryPolicy,
    pub schedule_enabled: bool,
    pub api_auth: Option<BasicAuth>,
    pub reddit: Option<RedditCredentials>,
    pub twitter: Option<TwitterCredentials>,
    pub bluesky: Option<BlueskyCredentials>,
    pub youtube_api_key: Option<String>,
    pub instagram: Option<InstagramCredentials>,
    pub openai_api_key: Option<String>,
    pub smtp: Option<SmtpSettings>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key → value lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| {
            lookup(k)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let num = |k: &str, default: u64| -> Result<u64> {
            match get(k) {
                Some(v) => v
                    .parse::<u64>()
                    .with_context(|| format!("{k} must be a non-negative integer, got `{v}`")),
                None => Ok(default),
            }
        };
        let pair = |a: &str, b: &str| match (get(a), get(b)) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        };

        let interval_min = num("SCAN_INTERVAL_MINUTES", DEFAULT_SCAN_INTERVAL_MINUTES)?;
        if interval_min == 0 {
            return Err(anyhow!("SCAN_INTERVAL_MINUTES must be at least 1"));
        }
        let timeout_secs = num("SCAN_TIMEOUT_SECS", DEFAULT_SCAN_TIMEOUT_SECS)?;
        let retry_base_ms = num("RETRY_BASE_MS", DEFAULT_RETRY_BASE.as_millis() as u64)?;
        let retry_attempts = num("RETRY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS as u64)?;

        let smtp = match (get("SMTP_HOST"), get("NOTIFY_EMAIL_FROM"), get("NOTIFY_EMAIL_TO")) {
            (Some(host), Some(from), Some(to)) => Some(SmtpSettings {
                host,
                user: get("SMTP_USER"),
                pass: get("SMTP_PASS"),
                from,
                to: to
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            }),
            _ => None,
        };

        Ok(Self {
            scan_interval: Duration::from_secs(interval_min.saturating_mul(60)),
            scan_timeout: Duration::from_secs(timeout_secs),
            keywords_path: get("KEYWORDS_PATH").map(PathBuf::from),
            session_dir: get("SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_DIR)),
            retry: RetryPolicy::new(
                Duration::from_millis(retry_base_ms),
                u32::try_from(retry_attempts).unwrap_or(u32::MAX),
            ),
            schedule_enabled: get("SCAN_SCHEDULE").is_some_and(|v| v == "1"),
            api_auth: pair("API_USERNAME", "API_PASSWORD")
                .map(|(username, password)| BasicAuth { username, password }),
            reddit: pair("REDDIT_CLIENT_ID", "REDDIT_CLIENT_SECRET").map(
                |(client_id, client_secret)| RedditCredentials {
                    client_id,
                    client_secret,
                    user_agent: get("REDDIT_USER_AGENT")
                        .unwrap_or_else(|| crate::USER_AGENT.to_string()),
                },
            ),
            twitter: pair("TWITTER_API_KEY", "TWITTER_API_SECRET")
                .map(|(api_key, api_secret)| TwitterCredentials { api_key, api_secret }),
            bluesky: pair("BLUESKY_IDENTIFIER", "BLUESKY_PASSWORD")
                .map(|(identifier, password)| BlueskyCredentials { identifier, password }),
            youtube_api_key: get("YOUTUBE_API_KEY"),
            instagram: pair("INSTAGRAM_ACCESS_TOKEN", "INSTAGRAM_USER_ID").map(
                |(access_token, user_id)| InstagramCredentials {
                    access_token,
                    user_id,
                },
            ),
            openai_api_key: get("OPENAI_API_KEY"),
            smtp,
        })
    }

    pub fn has_credentials(&self, kind: SourceKind) -> bool {
        match kind {
            SourceKind::Reddit => self.reddit.is_some(),
            SourceKind::Twitter => self.twitter.is_some(),
            SourceKind::Bluesky => self.bluesky.is_some(),
            SourceKind::YouTube => self.youtube_api_key.is_some(),
            SourceKind::Instagram => self.instagram.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.scan_interval, Duration::from_secs(3600));
        assert_eq!(s.scan_timeout, Duration::from_secs(900));
        assert_eq!(s.session_dir, PathBuf::from("state/sessions"));
        assert_eq!(s.retry, RetryPolicy::default());
        assert!(!s.schedule_enabled);
        assert!(s.api_auth.is_none());
        assert!(SourceKind::ALL.iter().all(|k| !s.has_credentials(*k)));
    }

    #[test]
    fn credentials_need_both_halves() {
        let s = settings(&[
            ("REDDIT_CLIENT_ID", "id"),
            ("BLUESKY_IDENTIFIER", "me.bsky.social"),
            ("BLUESKY_PASSWORD", "  "),
            ("YOUTUBE_API_KEY", "k"),
        ])
        .unwrap();
        assert!(!s.has_credentials(SourceKind::Reddit));
        assert!(!s.has_credentials(SourceKind::Bluesky));
        assert!(s.has_credentials(SourceKind::YouTube));
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(settings(&[("SCAN_TIMEOUT_SECS", "soon")]).is_err());
        assert!(settings(&[("SCAN_INTERVAL_MINUTES", "0")]).is_err());
    }

    #[test]
    fn smtp_recipients_are_split() {
        let s = settings(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("NOTIFY_EMAIL_FROM", "bot@example.com"),
            ("NOTIFY_EMAIL_TO", "a@example.com, b@example.com,"),
        ])
        .unwrap();
        let smtp = s.smtp.unwrap();
        assert_eq!(smtp.to, vec!["a@example.com", "b@example.com"]);
        assert!(smtp.user.is_none());
    }
}
