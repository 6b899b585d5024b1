// src/sources/instagram.rs
//! Instagram Graph API. Login refreshes the long-lived token; an account
//! sub-target expands (via business discovery) into a random handful of its
//! most recent reels that have comments; each reel's comments are a stream
//! paged by the `after` cursor.

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;

use super::http::{self, parse_timestamp, read_json, url_with};
use super::{Page, RawItem, SourceApi, Stream};
use crate::config::settings::InstagramCredentials;
use crate::error::{Result, ScanError};
use crate::model::{SourceDetails, SourceKind};
use crate::session::SessionCredential;

const GRAPH_URL: &str = "https://graph.facebook.com/v19.0";
const REFRESH_URL: &str = "https://graph.instagram.com/refresh_access_token";
const REELS_MIN: usize = 10;
const REELS_MAX: usize = 15;

pub struct InstagramApi {
    creds: InstagramCredentials,
    http: reqwest::Client,
    graph_url: String,
    refresh_url: String,
    token: Option<String>,
}

impl InstagramApi {
    pub fn new(creds: InstagramCredentials) -> anyhow::Result<Self> {
        Ok(Self {
            creds,
            http: http::client(crate::USER_AGENT)?,
            graph_url: GRAPH_URL.to_string(),
            refresh_url: REFRESH_URL.to_string(),
            token: None,
        })
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.graph_url = base.to_string();
        self.refresh_url = format!("{base}/refresh_access_token");
        self
    }

    fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or(ScanError::AuthenticationExpired)
    }

    /// A token Graph rejected as expired cannot refresh itself; the next
    /// login falls back to the configured one.
    fn forget_expired<T>(&mut self, res: Result<T>) -> Result<T> {
        if matches!(&res, Err(e) if e.is_auth_expired()) {
            self.token = None;
        }
        res
    }
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    code: i64,
}

/// Graph API error codes: 190 expired/invalid token, 4/17/32/613 throttling,
/// 10/200 permissions, 100 unknown object.
fn refine(_status: u16, body: &str) -> Option<ScanError> {
    let err = serde_json::from_str::<GraphErrorBody>(body).ok()?.error;
    match err.code {
        190 => Some(ScanError::AuthenticationExpired),
        4 | 17 | 32 | 613 => Some(ScanError::RateLimited { retry_after: None }),
        10 | 200 => Some(ScanError::Fatal(format!("permission denied: {}", err.message))),
        100 => Some(ScanError::Skipped(err.message)),
        _ if err.kind == "OAuthException" => Some(ScanError::Blocked(err.message)),
        _ => None,
    }
}

fn refine_login(status: u16, body: &str) -> Option<ScanError> {
    match refine(status, body) {
        Some(ScanError::AuthenticationExpired) => Some(ScanError::AuthenticationFatal(
            "instagram token can no longer be refreshed".into(),
        )),
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    business_discovery: Discovery,
}

#[derive(Debug, Deserialize)]
struct Discovery {
    #[serde(default)]
    media: Option<MediaList>,
}

#[derive(Debug, Deserialize)]
struct MediaList {
    #[serde(default)]
    data: Vec<Media>,
}

#[derive(Debug, Deserialize)]
struct Media {
    id: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    comments_count: u64,
    #[serde(default)]
    media_product_type: String,
}

#[derive(Debug, Deserialize)]
struct CommentsResponse {
    #[serde(default)]
    data: Vec<IgComment>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct IgComment {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    username: String,
    timestamp: String,
    #[serde(default)]
    like_count: u64,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    cursors: Option<Cursors>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Cursors {
    #[serde(default)]
    after: Option<String>,
}

/// `https://www.instagram.com/reel/<code>/` → `<code>`.
fn media_code(permalink: &str) -> Option<&str> {
    permalink
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|c| !c.is_empty() && !c.contains(':'))
}

/// Reels with comments, newest first, capped at `take`.
fn select_reels(body: &str, account: &str, take: usize) -> Result<Vec<Stream>> {
    let resp: DiscoveryResponse = serde_json::from_str(body)?;
    let media = resp.business_discovery.media.map(|m| m.data).unwrap_or_default();
    Ok(media
        .into_iter()
        .filter(|m| m.media_product_type.eq_ignore_ascii_case("REELS") && m.comments_count > 0)
        .filter_map(|m| {
            let code = media_code(&m.permalink)?.to_string();
            Some(Stream::new(account, m.id).with_label(code))
        })
        .take(take)
        .collect())
}

fn parse_comments(body: &str, code: &str) -> Result<Page> {
    let resp: CommentsResponse = serde_json::from_str(body)?;
    let mut items = Vec::with_capacity(resp.data.len());
    for c in resp.data {
        items.push(RawItem {
            id: c.id,
            title: None,
            body: c.text,
            author: c.username,
            url: format!("https://www.instagram.com/reel/{code}/"),
            created_at: parse_timestamp(&c.timestamp)?,
            details: SourceDetails::Instagram {
                media_code: code.to_string(),
                likes: c.like_count,
            },
        });
    }
    // Graph only includes `next` when there is another page.
    let next = resp.paging.and_then(|p| {
        p.next.as_ref()?;
        p.cursors.and_then(|c| c.after)
    });
    Ok(Page { items, next })
}

#[async_trait]
impl SourceApi for InstagramApi {
    fn kind(&self) -> SourceKind {
        SourceKind::Instagram
    }

    async fn login(&mut self) -> Result<SessionCredential> {
        // A stored refreshed token beats the configured one once it exists.
        let current = self
            .token
            .clone()
            .unwrap_or_else(|| self.creds.access_token.clone());
        let url = url_with(
            &self.refresh_url,
            &[
                ("grant_type", Some("ig_refresh_token")),
                ("access_token", Some(current.as_str())),
            ],
        )?;
        let resp = self.http.get(url).send().await?;
        let r: RefreshResponse = read_json(resp, refine_login).await?;
        self.token = Some(r.access_token.clone());
        Ok(SessionCredential::new(json!({
            "token": r.access_token,
            "expires_in": r.expires_in,
        })))
    }

    async fn restore(&mut self, cred: &SessionCredential) -> Result<()> {
        let t = cred
            .token()
            .ok_or_else(|| ScanError::MalformedUpstreamResponse("stored session has no token".into()))?;
        self.token = Some(t.to_string());
        Ok(())
    }

    async fn streams(&mut self, sub_target: &str) -> Result<Vec<Stream>> {
        let account = sub_target.trim().trim_start_matches('@');
        let fields = format!(
            "business_discovery.username({account}){{media.limit(30){{id,permalink,timestamp,comments_count,media_product_type}}}}"
        );
        let url = url_with(
            &format!("{}/{}", self.graph_url, self.creds.user_id),
            &[("fields", Some(fields.as_str())), ("access_token", Some(self.token()?))],
        )?;
        let resp = self.http.get(url).send().await?;
        let body = http::read_body(resp, refine).await;
        let body = self.forget_expired(body)?;
        let take = rand::rng().random_range(REELS_MIN..=REELS_MAX);
        select_reels(&body, sub_target, take)
    }

    async fn fetch_page(&mut self, stream: &Stream, cursor: Option<&str>) -> Result<Page> {
        let url = url_with(
            &format!("{}/{}/comments", self.graph_url, stream.id),
            &[
                ("fields", Some("id,text,username,timestamp,like_count")),
                ("limit", Some("50")),
                ("after", cursor),
                ("access_token", Some(self.token()?)),
            ],
        )?;
        let resp = self.http.get(url).send().await?;
        let body = http::read_body(resp, refine).await;
        let body = self.forget_expired(body)?;
        parse_comments(&body, stream.label.as_deref().unwrap_or(stream.id.as_str()))
    }

    async fn close(&mut self) -> Result<()> {
        self.token = None;
        Ok(())
    }
}
