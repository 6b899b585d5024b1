// src/sources/youtube.rs
//! YouTube Data API v3: API key only. A channel expands to its latest videos;
//! each video's comment threads form one stream paged by `pageToken`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::http::{self, parse_timestamp, url_with};
use super::{Page, RawItem, SourceApi, Stream};
use crate::error::{Result, ScanError};
use crate::model::{SourceDetails, SourceKind};
use crate::session::SessionCredential;
use crate::text::normalize_text;

const BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const LATEST_VIDEOS: &str = "5";

pub struct YouTubeApi {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl YouTubeApi {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        Ok(Self {
            api_key,
            http: http::client(crate::USER_AGENT)?,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base_url = base.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    reason: String,
}

fn refine(_status: u16, body: &str) -> Option<ScanError> {
    let parsed: ApiErrorBody = serde_json::from_str(body).ok()?;
    let reason = parsed.error.errors.first().map(|e| e.reason.as_str())?;
    match reason {
        "commentsDisabled" | "videoNotFound" | "channelNotFound" => {
            Some(ScanError::Skipped(reason.to_string()))
        }
        "quotaExceeded" | "dailyLimitExceeded" => {
            Some(ScanError::Fatal(format!("quota exhausted: {}", parsed.error.message)))
        }
        "rateLimitExceeded" | "userRateLimitExceeded" => {
            Some(ScanError::RateLimited { retry_after: None })
        }
        "keyInvalid" | "keyExpired" => Some(ScanError::AuthenticationFatal(reason.to_string())),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
    #[serde(default)]
    snippet: Option<VideoSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoSnippet {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadsResponse {
    #[serde(default)]
    items: Vec<Thread>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thread {
    snippet: ThreadSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadSnippet {
    top_level_comment: Comment,
}

#[derive(Debug, Deserialize)]
struct Comment {
    id: String,
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    #[serde(default)]
    text_original: Option<String>,
    #[serde(default)]
    text_display: String,
    #[serde(default)]
    author_display_name: String,
    #[serde(default)]
    like_count: u64,
    published_at: String,
}

fn parse_videos(body: &str, channel: &str) -> Result<Vec<Stream>> {
    let resp: SearchResponse = serde_json::from_str(body)?;
    Ok(resp
        .items
        .into_iter()
        .filter_map(|it| {
            let id = it.id.video_id?;
            let title = it.snippet.map(|s| normalize_text(&s.title)).unwrap_or_default();
            Some(Stream::new(channel, id).with_label(title))
        })
        .collect())
}

fn parse_threads(body: &str, video_id: &str) -> Result<Page> {
    let resp: ThreadsResponse = serde_json::from_str(body)?;
    let mut items = Vec::with_capacity(resp.items.len());
    for t in resp.items {
        let c = t.snippet.top_level_comment;
        let text = c
            .snippet
            .text_original
            .unwrap_or_else(|| normalize_text(&c.snippet.text_display));
        items.push(RawItem {
            url: format!("https://www.youtube.com/watch?v={video_id}&lc={}", c.id),
            id: c.id,
            title: None,
            body: text,
            author: c.snippet.author_display_name,
            created_at: parse_timestamp(&c.snippet.published_at)?,
            details: SourceDetails::YouTube {
                video_id: video_id.to_string(),
                likes: c.snippet.like_count,
            },
        });
    }
    Ok(Page {
        items,
        next: resp.next_page_token.filter(|t| !t.is_empty()),
    })
}

#[async_trait]
impl SourceApi for YouTubeApi {
    fn kind(&self) -> SourceKind {
        SourceKind::YouTube
    }

    fn persists_session(&self) -> bool {
        false
    }

    async fn login(&mut self) -> Result<SessionCredential> {
        if self.api_key.trim().is_empty() {
            return Err(ScanError::AuthenticationFatal("empty YouTube API key".into()));
        }
        Ok(SessionCredential::new(json!({})))
    }

    async fn restore(&mut self, _cred: &SessionCredential) -> Result<()> {
        Ok(())
    }

    async fn streams(&mut self, sub_target: &str) -> Result<Vec<Stream>> {
        let url = url_with(
            &format!("{}/search", self.base_url),
            &[
                ("part", Some("snippet")),
                ("channelId", Some(sub_target.trim())),
                ("order", Some("date")),
                ("type", Some("video")),
                ("maxResults", Some(LATEST_VIDEOS)),
                ("key", Some(self.api_key.as_str())),
            ],
        )?;
        let resp = self.http.get(url).send().await?;
        let body = http::read_body(resp, refine).await?;
        parse_videos(&body, sub_target)
    }

    async fn fetch_page(&mut self, stream: &Stream, cursor: Option<&str>) -> Result<Page> {
        let url = url_with(
            &format!("{}/commentThreads", self.base_url),
            &[
                ("part", Some("snippet")),
                ("videoId", Some(stream.id.as_str())),
                ("order", Some("time")),
                ("textFormat", Some("plainText")),
                ("maxResults", Some("100")),
                ("pageToken", cursor),
                ("key", Some(self.api_key.as_str())),
            ],
        )?;
        let resp = self.http.get(url).send().await?;
        let body = http::read_body(resp, refine).await?;
        parse_threads(&body, &stream.id)
    }
}
