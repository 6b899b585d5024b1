// src/matcher/semantic.rs
//! Embedding-similarity stage and the embedder abstraction behind it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::MatchResult;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;

/// Turns texts into vectors. One vector per input, same order.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn model_name(&self) -> &str;
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Matches text whose embedding is close enough to one of the keywords.
pub struct SemanticStage {
    embedder: Arc<dyn Embedder>,
    keywords: Vec<String>,
    threshold: f32,
    keyword_vectors: OnceCell<Vec<Vec<f32>>>,
}

impl SemanticStage {
    pub fn new(embedder: Arc<dyn Embedder>, keywords: Vec<String>, threshold: f32) -> Self {
        let threshold = if threshold.is_finite() {
            threshold.clamp(-1.0, 1.0)
        } else {
            DEFAULT_SIMILARITY_THRESHOLD
        };
        Self {
            embedder,
            keywords,
            threshold,
            keyword_vectors: OnceCell::new(),
        }
    }

    async fn keyword_vectors(&self) -> Result<&Vec<Vec<f32>>> {
        self.keyword_vectors
            .get_or_try_init(|| async {
                let v = self.embedder.embed(&self.keywords).await?;
                if v.len() != self.keywords.len() {
                    return Err(anyhow!(
                        "embedder returned {} vectors for {} keywords",
                        v.len(),
                        self.keywords.len()
                    ));
                }
                Ok(v)
            })
            .await
    }

    async fn try_evaluate(&self, text: &str) -> Result<MatchResult> {
        if self.keywords.is_empty() {
            return Ok(MatchResult::miss());
        }
        let kw_vecs = self.keyword_vectors().await?;
        let text_vec = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedder returned no vector for text"))?;

        let best = kw_vecs
            .iter()
            .enumerate()
            .map(|(i, kv)| (i, cosine_similarity(kv, &text_vec)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((i, sim)) if sim > self.threshold => Ok(MatchResult::hit(self.keywords[i].clone())),
            _ => Ok(MatchResult::miss()),
        }
    }

    /// Embedder failures degrade to a miss.
    pub async fn evaluate(&self, text: &str) -> MatchResult {
        match self.try_evaluate(text).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "matcher", error = %e, model = self.embedder.model_name(), "semantic stage failed");
                MatchResult::miss()
            }
        }
    }
}

/// OpenAI embeddings endpoint (`text-embedding-3-small` by default).
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()
            .context("build embeddings http client")?;
        Ok(Self {
            http,
            api_key,
            model: "text-embedding-3-small".to_string(),
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[async_trait::async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            input: &'a [String],
        }
        #[derive(Deserialize)]
        struct Resp {
            data: Vec<Item>,
        }
        #[derive(Deserialize)]
        struct Item {
            index: usize,
            embedding: Vec<f32>,
        }

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&Req {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .context("embeddings request")?
            .error_for_status()
            .context("embeddings non-2xx")?;

        let mut body: Resp = resp.json().await.context("embeddings body")?;
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Maps known words onto fixed axes; everything else is orthogonal noise.
    struct AxisEmbedder;

    #[async_trait::async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    if t.contains("launch") || t.contains("release") {
                        vec![1.0, 0.1, 0.0]
                    } else if t.contains("pricing") {
                        vec![0.0, 1.0, 0.0]
                    } else {
                        vec![0.0, 0.0, 1.0]
                    }
                })
                .collect())
        }
        fn model_name(&self) -> &str {
            "axis"
        }
    }

    struct FailingEmbedder;

    #[async_trait::async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(anyhow!("boom"))
        }
        fn model_name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn closest_keyword_is_reported_above_threshold() {
        let stage = SemanticStage::new(
            Arc::new(AxisEmbedder),
            vec!["launch".into(), "pricing".into()],
            0.8,
        );
        let r = stage.evaluate("our release goes out tomorrow").await;
        assert!(r.matched());
        assert_eq!(r.term(), "launch");

        let miss = stage.evaluate("cats and dogs").await;
        assert!(!miss.matched());
    }

    #[tokio::test]
    async fn embedder_failure_is_a_miss() {
        let stage = SemanticStage::new(Arc::new(FailingEmbedder), vec!["launch".into()], 0.5);
        assert!(!stage.evaluate("launch").await.matched());
    }
}
