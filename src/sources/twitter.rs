// src/sources/twitter.rs
//! Twitter / X communities: OAuth2 app bearer token, community timeline
//! paged by `next_token`.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;

use super::http::{self, parse_timestamp, read_json, url_with};
use super::{Page, RawItem, SourceApi, Stream};
use crate::config::settings::TwitterCredentials;
use crate::error::{Result, ScanError};
use crate::model::{SourceDetails, SourceKind};
use crate::session::SessionCredential;

const BASE_URL: &str = "https://api.twitter.com";

pub struct TwitterApi {
    creds: TwitterCredentials,
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl TwitterApi {
    pub fn new(creds: TwitterCredentials) -> anyhow::Result<Self> {
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
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token_type: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Timeline {
    #[serde(default)]
    data: Vec<Tweet>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    created_at: String,
    #[serde(default)]
    author_id: String,
    #[serde(default)]
    public_metrics: Metrics,
}

#[derive(Debug, Default, Deserialize)]
struct Metrics {
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    retweet_count: u64,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    username: String,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    next_token: Option<String>,
}

fn parse_timeline(body: &str, community: &str) -> Result<Page> {
    let tl: Timeline = serde_json::from_str(body)?;
    let users: HashMap<&str, &str> = tl
        .includes
        .users
        .iter()
        .map(|u| (u.id.as_str(), u.username.as_str()))
        .collect();

    let mut items = Vec::with_capacity(tl.data.len());
    for t in &tl.data {
        let author = users
            .get(t.author_id.as_str())
            .copied()
            .unwrap_or(t.author_id.as_str())
            .to_string();
        let url = if author.is_empty() {
            format!("https://x.com/i/web/status/{}", t.id)
        } else {
            format!("https://x.com/{author}/status/{}", t.id)
        };
        items.push(RawItem {
            id: t.id.clone(),
            title: None,
            body: t.text.clone(),
            author,
            url,
            created_at: parse_timestamp(&t.created_at)?,
            details: SourceDetails::Twitter {
                community: community.to_string(),
                likes: t.public_metrics.like_count,
                retweets: t.public_metrics.retweet_count,
            },
        });
    }
    Ok(Page {
        items,
        next: tl.meta.next_token,
    })
}

fn refine_login(status: u16, _body: &str) -> Option<ScanError> {
    match status {
        400 | 401 => Some(ScanError::AuthenticationFatal(
            "twitter rejected app credentials".into(),
        )),
        403 => Some(ScanError::Blocked("twitter token endpoint refused the login".into())),
        _ => None,
    }
}

#[async_trait]
impl SourceApi for TwitterApi {
    fn kind(&self) -> SourceKind {
        SourceKind::Twitter
    }

    async fn login(&mut self) -> Result<SessionCredential> {
        let resp = self
            .http
            .post(format!("{}/oauth2/token", self.base_url))
            .basic_auth(&self.creds.api_key, Some(&self.creds.api_secret))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded;charset=UTF-8")
            .body("grant_type=client_credentials")
            .send()
            .await?;
        let tok: TokenResponse = read_json(resp, refine_login).await?;
        if !tok.token_type.is_empty() && !tok.token_type.eq_ignore_ascii_case("bearer") {
            return Err(ScanError::MalformedUpstreamResponse(format!(
                "unexpected token type `{}`",
                tok.token_type
            )));
        }
        self.token = Some(tok.access_token.clone());
        Ok(SessionCredential::new(json!({ "token": tok.access_token })))
    }

    async fn restore(&mut self, cred: &SessionCredential) -> Result<()> {
        let t = cred
            .token()
            .ok_or_else(|| ScanError::MalformedUpstreamResponse("stored session has no token".into()))?;
        self.token = Some(t.to_string());
        Ok(())
    }

    async fn streams(&mut self, sub_target: &str) -> Result<Vec<Stream>> {
        Ok(vec![Stream::new(sub_target, sub_target.trim())])
    }

    async fn fetch_page(&mut self, stream: &Stream, cursor: Option<&str>) -> Result<Page> {
        let token = self.token.as_deref().ok_or(ScanError::AuthenticationExpired)?;
        let url = url_with(
            &format!("{}/2/communities/{}/tweets", self.base_url, stream.id),
            &[
                ("max_results", Some("100")),
                ("tweet.fields", Some("created_at,public_metrics,author_id")),
                ("expansions", Some("author_id")),
                ("user.fields", Some("username")),
                ("pagination_token", cursor),
            ],
        )?;
        let resp = self.http.get(url).bearer_auth(token).send().await?;
        let body = http::read_body(resp, http::plain).await?;
        parse_timeline(&body, &stream.id)
    }
}
