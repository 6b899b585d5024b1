// src/secondary_filter.rs
//! Optional model-based pass over the aggregated matches.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::model::CanonicalPost;

#[async_trait]
pub trait SecondaryFilter: Send + Sync {
    /// Keep the posts worth acting on. Any error fails the scan.
    async fn filter(&self, posts: Vec<CanonicalPost>) -> Result<Vec<CanonicalPost>>;

    fn name(&self) -> &'static str;
}

const SYSTEM_PROMPT: &str =
    "You are an expert at identifying potential business leads and networking opportunities.";

/// Asks a chat model, one post at a time, to answer through a forced
/// `should_promote` tool call.
pub struct OpenAiFilter {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiFilter {
    pub fn new(api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .context("build openai http client")?;
        Ok(Self {
            http,
            api_key,
            model: "gpt-4o-mini".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    fn request_body(&self, post: &CanonicalPost) -> Value {
        let user = format!(
            "Here's a post from {}:\n\nTitle: {}\nContent: {}\nAuthor: {}\n\n\
             Return true if ANY of these are true:\n\
             1. The post is asking people to share what they're working on\n\
             2. The author is seeking business/startup ideas\n\
             3. The author is looking for SaaS products or business tools\n\
             4. The post is about lead generation or finding customers",
            post.source,
            post.title.as_deref().unwrap_or("N/A"),
            post.content,
            post.author
        );
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user}
            ],
            "tools": [{
                "type": "function",
                "function": {
                    "name": "should_promote",
                    "description": "Return whether this post represents a lead opportunity",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "promote": {
                                "type": "boolean",
                                "description": "Whether this post represents a potential lead"
                            }
                        },
                        "required": ["promote"]
                    }
                }
            }],
            "tool_choice": {"type": "function", "function": {"name": "should_promote"}}
        })
    }

    async fn should_promote(&self, post: &CanonicalPost) -> Result<bool> {
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(post))
            .send()
            .await
            .context("openai request")?
            .error_for_status()
            .context("openai non-2xx")?;
        let body: Value = resp.json().await.context("openai body")?;
        parse_decision(&body)
    }
}

/// Pull `promote` out of the first tool call's JSON arguments.
fn parse_decision(body: &Value) -> Result<bool> {
    #[derive(Deserialize)]
    struct Args {
        promote: bool,
    }
    let args = body
        .pointer("/choices/0/message/tool_calls/0/function/arguments")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("response carries no should_promote tool call"))?;
    let parsed: Args = serde_json::from_str(args).context("tool call arguments")?;
    Ok(parsed.promote)
}

#[async_trait]
impl SecondaryFilter for OpenAiFilter {
    async fn filter(&self, posts: Vec<CanonicalPost>) -> Result<Vec<CanonicalPost>> {
        let total = posts.len();
        let mut kept = Vec::with_capacity(total);
        for post in posts {
            if self.should_promote(&post).await? {
                kept.push(post);
            }
        }
        tracing::info!(target: "filter", kept = kept.len(), total, "secondary filter done");
        Ok(kept)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_from_tool_call() {
        let body = json!({"choices": [{"message": {"tool_calls": [
            {"type": "function", "function": {"name": "should_promote", "arguments": "{\"promote\": true}"}}
        ]}}]});
        assert!(parse_decision(&body).unwrap());

        let no_call = json!({"choices": [{"message": {"content": "yes"}}]});
        assert!(parse_decision(&no_call).is_err());

        let bad_args = json!({"choices": [{"message": {"tool_calls": [
            {"function": {"arguments": "{\"promote\": \"maybe\"}"}}
        ]}}]});
        assert!(parse_decision(&bad_args).is_err());
    }
}
