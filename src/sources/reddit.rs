// src/sources/reddit.rs
//! Reddit: app-only OAuth token, `/r/{sub}/new` listings paged by `after`.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;

use super::http::{self, read_json, url_with};
use super::{Page, RawItem, SourceApi, Stream};
use crate::config::settings::RedditCredentials;
use crate::error::{Result, ScanError};
use crate::model::{SourceDetails, SourceKind};
use crate::session::SessionCredential;
use crate::text::normalize_text;

const AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_URL: &str = "https://oauth.reddit.com";
const PAGE_LIMIT: &str = "100";

pub struct RedditApi {
    creds: RedditCredentials,
    http: reqwest::Client,
    auth_url: String,
    api_url: String,
    token: Option<String>,
}

impl RedditApi {
    pub fn new(creds: RedditCredentials) -> anyhow::Result<Self> {
        let http = http::client(&creds.user_agent)?;
        Ok(Self {
            creds,
            http,
            auth_url: AUTH_URL.to_string(),
            api_url: API_URL.to_string(),
            token: None,
        })
    }

    /// Point both endpoints at another host (tests, proxies).
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.auth_url = format!("{base}/api/v1/access_token");
        self.api_url = base.to_string();
        self
    }

    fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or(ScanError::AuthenticationExpired)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    permalink: String,
    created_utc: f64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    #[serde(default)]
    subreddit: String,
}

fn parse_listing(body: &str, subreddit: &str) -> Result<Page> {
    let listing: Listing = serde_json::from_str(body)?;
    let mut items = Vec::with_capacity(listing.data.children.len());
    for Child { data: p } in listing.data.children {
        let created_at = chrono::DateTime::from_timestamp(p.created_utc as i64, 0).ok_or_else(|| {
            ScanError::MalformedUpstreamResponse(format!("bad created_utc {}", p.created_utc))
        })?;
        let sub = if p.subreddit.is_empty() {
            subreddit.to_string()
        } else {
            p.subreddit
        };
        items.push(RawItem {
            id: p.id,
            title: Some(normalize_text(&p.title)),
            body: normalize_text(&p.selftext),
            author: p.author,
            url: format!("https://www.reddit.com{}", p.permalink),
            created_at,
            details: SourceDetails::Reddit {
                subreddit: sub,
                score: p.score,
                num_comments: p.num_comments,
            },
        });
    }
    Ok(Page {
        items,
        next: listing.data.after.filter(|a| !a.is_empty()),
    })
}

fn refine_login(status: u16, _body: &str) -> Option<ScanError> {
    match status {
        400 | 401 => Some(ScanError::AuthenticationFatal(
            "reddit rejected client credentials".into(),
        )),
        _ => None,
    }
}

#[async_trait]
impl SourceApi for RedditApi {
    fn kind(&self) -> SourceKind {
        SourceKind::Reddit
    }

    async fn login(&mut self) -> Result<SessionCredential> {
        let resp = self
            .http
            .post(&self.auth_url)
            .basic_auth(&self.creds.client_id, Some(&self.creds.client_secret))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await?;
        let tok: TokenResponse = read_json(resp, refine_login).await?;
        match (tok.access_token, tok.error) {
            (Some(t), _) if !t.is_empty() => {
                self.token = Some(t.clone());
                Ok(SessionCredential::new(json!({ "token": t })))
            }
            (_, Some(err)) => Err(ScanError::AuthenticationFatal(err)),
            _ => Err(ScanError::MalformedUpstreamResponse(
                "token response without access_token".into(),
            )),
        }
    }

    async fn restore(&mut self, cred: &SessionCredential) -> Result<()> {
        let t = cred
            .token()
            .ok_or_else(|| ScanError::MalformedUpstreamResponse("stored session has no token".into()))?;
        self.token = Some(t.to_string());
        Ok(())
    }

    async fn streams(&mut self, sub_target: &str) -> Result<Vec<Stream>> {
        let sub = sub_target.trim().trim_start_matches("r/");
        Ok(vec![Stream::new(sub_target, sub)])
    }

    async fn fetch_page(&mut self, stream: &Stream, cursor: Option<&str>) -> Result<Page> {
        let url = url_with(
            &format!("{}/r/{}/new", self.api_url, stream.id),
            &[("limit", Some(PAGE_LIMIT)), ("raw_json", Some("1")), ("after", cursor)],
        )?;
        let resp = self.http.get(url).bearer_auth(self.token()?).send().await?;
        let body = http::read_body(resp, http::plain).await?;
        parse_listing(&body, &stream.id)
    }

    async fn close(&mut self) -> Result<()> {
        self.token = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{
      "kind": "Listing",
      "data": {
        "after": "t3_abc",
        "children": [
          {"kind": "t3", "data": {
            "id": "abc", "title": "What are you building this week?",
            "selftext": "Share &amp; tell", "author": "alice",
            "permalink": "/r/SaaS/comments/abc/x/", "created_utc": 1740830400.0,
            "score": 12, "num_comments": 4, "subreddit": "SaaS"
          }}
        ]
      }
    }"#;

    #[test]
    fn listing_parses_into_items() {
        let page = parse_listing(LISTING, "SaaS").unwrap();
        assert_eq!(page.next.as_deref(), Some("t3_abc"));
        let it = &page.items[0];
        assert_eq!(it.body, "Share & tell");
        assert_eq!(it.url, "https://www.reddit.com/r/SaaS/comments/abc/x/");
        assert_eq!(it.created_at.timestamp(), 1_740_830_400);
        assert!(matches!(
            it.details,
            SourceDetails::Reddit { score: 12, num_comments: 4, .. }
        ));
    }

    #[test]
    fn empty_after_ends_stream() {
        let page = parse_listing(r#"{"data":{"after":"","children":[]}}"#, "x").unwrap();
        assert!(page.next.is_none());
        assert!(page.items.is_empty());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_listing("<html>", "x"),
            Err(ScanError::MalformedUpstreamResponse(_))
        ));
    }
}
