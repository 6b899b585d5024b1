// src/sources/bluesky.rs
//! Bluesky: `createSession` with an app password, custom feeds paged by
//! `cursor`. Sub-targets are `handle/feed_id` (or a full `at://` feed URI).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::http::{self, parse_timestamp, read_json, url_with};
use super::{Page, RawItem, SourceApi, Stream};
use crate::config::settings::BlueskyCredentials;
use crate::error::{Result, ScanError};
use crate::model::{SourceDetails, SourceKind};
use crate::session::SessionCredential;

const BASE_URL: &str = "https://bsky.social";
const PAGE_LIMIT: &str = "50";

pub struct BlueskyApi {
    creds: BlueskyCredentials,
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BlueskyApi {
    pub fn new(creds: BlueskyCredentials) -> anyhow::Result<Self> {
        Ok(Self {
            creds,
            http: http::client(crate::USER_AGENT)?,
            base_url: BASE_URL.to_string(),
            token: None,
        })
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base_url = base.trim_end_matches('/').to_string();
        self
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{method}", self.base_url)
    }

    fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or(ScanError::AuthenticationExpired)
    }
}

#[derive(Debug, Deserialize)]
struct XrpcError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// Bluesky reports expired tokens as 400 `ExpiredToken`.
fn refine(status: u16, body: &str) -> Option<ScanError> {
    let err: XrpcError = serde_json::from_str(body).ok()?;
    match (status, err.error.as_str()) {
        (_, "ExpiredToken" | "InvalidToken") => Some(ScanError::AuthenticationExpired),
        (400, "InvalidRequest") if err.message.contains("feed") => {
            Some(ScanError::Skipped(format!("feed unavailable: {}", err.message)))
        }
        (400, "UnknownFeed") => Some(ScanError::Skipped(err.message)),
        _ => None,
    }
}

fn refine_login(status: u16, body: &str) -> Option<ScanError> {
    match status {
        400 | 401 => {
            let msg = serde_json::from_str::<XrpcError>(body)
                .map(|e| e.message)
                .unwrap_or_default();
            Some(ScanError::AuthenticationFatal(format!(
                "bluesky rejected credentials: {msg}"
            )))
        }
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_jwt: String,
    #[serde(default)]
    refresh_jwt: String,
    #[serde(default)]
    did: String,
}

#[derive(Debug, Deserialize)]
struct ResolveHandle {
    did: String,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    feed: Vec<FeedEntry>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    post: Post,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Post {
    uri: String,
    author: Author,
    record: Record,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    repost_count: u64,
}

#[derive(Debug, Deserialize)]
struct Author {
    handle: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    #[serde(default)]
    text: String,
    created_at: String,
}

/// `handle/feed_id` → (handle, feed_id).
fn split_target(target: &str) -> Result<(&str, &str)> {
    target
        .trim()
        .split_once('/')
        .filter(|(h, f)| !h.is_empty() && !f.is_empty())
        .ok_or_else(|| ScanError::Skipped(format!("feed target `{target}` is not handle/feed_id")))
}

fn feed_uri(did: &str, feed_id: &str) -> String {
    format!("at://{did}/app.bsky.feed.generator/{feed_id}")
}

/// Public web URL of a post from its `at://did/app.bsky.feed.post/rkey` URI.
fn post_url(handle: &str, uri: &str) -> String {
    let rkey = uri.rsplit('/').next().unwrap_or_default();
    format!("https://bsky.app/profile/{handle}/post/{rkey}")
}

fn parse_feed(body: &str, feed: &str) -> Result<Page> {
    let resp: FeedResponse = serde_json::from_str(body)?;
    let mut items = Vec::with_capacity(resp.feed.len());
    for FeedEntry { post } in resp.feed {
        items.push(RawItem {
            url: post_url(&post.author.handle, &post.uri),
            id: post.uri,
            title: None,
            body: post.record.text,
            author: post.author.handle,
            created_at: parse_timestamp(&post.record.created_at)?,
            details: SourceDetails::Bluesky {
                feed: feed.to_string(),
                likes: post.like_count,
                reposts: post.repost_count,
            },
        });
    }
    Ok(Page {
        items,
        next: resp.cursor.filter(|c| !c.is_empty()),
    })
}

#[async_trait]
impl SourceApi for BlueskyApi {
    fn kind(&self) -> SourceKind {
        SourceKind::Bluesky
    }

    async fn login(&mut self) -> Result<SessionCredential> {
        let resp = self
            .http
            .post(self.xrpc("com.atproto.server.createSession"))
            .json(&json!({
                "identifier": self.creds.identifier,
                "password": self.creds.password,
            }))
            .send()
            .await?;
        let s: SessionResponse = read_json(resp, refine_login).await?;
        self.token = Some(s.access_jwt.clone());
        Ok(SessionCredential::new(json!({
            "token": s.access_jwt,
            "refresh": s.refresh_jwt,
            "did": s.did,
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
        if sub_target.starts_with("at://") {
            return Ok(vec![Stream::new(sub_target, sub_target)]);
        }
        let (handle, feed_id) = split_target(sub_target)?;
        let url = url_with(
            &self.xrpc("com.atproto.identity.resolveHandle"),
            &[("handle", Some(handle))],
        )?;
        let resp = self.http.get(url).bearer_auth(self.token()?).send().await?;
        let r: ResolveHandle = read_json(resp, refine).await?;
        Ok(vec![
            Stream::new(sub_target, feed_uri(&r.did, feed_id)).with_label(feed_id)
        ])
    }

    async fn fetch_page(&mut self, stream: &Stream, cursor: Option<&str>) -> Result<Page> {
        let url = url_with(
            &self.xrpc("app.bsky.feed.getFeed"),
            &[
                ("feed", Some(stream.id.as_str())),
                ("limit", Some(PAGE_LIMIT)),
                ("cursor", cursor),
            ],
        )?;
        let resp = self.http.get(url).bearer_auth(self.token()?).send().await?;
        let body = http::read_body(resp, refine).await?;
        parse_feed(&body, &stream.sub_target)
    }

    async fn close(&mut self) -> Result<()> {
        self.token = None;
        Ok(())
    }
}
