// src/config/keywords.rs
//! Per-source keyword lists, sub-targets and matching options.
//!
//! ```toml
//! [reddit]
//! keywords = ["launch", "mvp"]
//! exclude_keywords = ["hiring"]
//! subreddits = ["SaaS", "startups"]
//!
//! [youtube]
//! keywords = ["indie hacker"]
//! channels = ["UC..."]
//! intent_patterns = false
//! semantic = { threshold = 0.82 }
//! ```
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::matcher::patterns::IntentPattern;
use crate::matcher::semantic::DEFAULT_SIMILARITY_THRESHOLD;
use crate::model::SourceKind;

pub const ENV_PATH: &str = "KEYWORDS_PATH";
pub const DEFAULT_MAX_PAGES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingMode {
    #[default]
    Jittered,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SemanticConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

fn default_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_true() -> bool {
    true
}

fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}

#[derive(Debug, Clone, Deserialize)]
struct RawPattern {
    id: String,
    pattern: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSource {
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    exclude_keywords: Vec<String>,
    #[serde(
        default,
        alias = "subreddits",
        alias = "communities",
        alias = "feeds",
        alias = "channels",
        alias = "accounts"
    )]
    sub_targets: Vec<String>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_true")]
    shuffle: bool,
    #[serde(default = "default_true")]
    intent_patterns: bool,
    #[serde(default)]
    extra_patterns: Vec<RawPattern>,
    #[serde(default)]
    semantic: Option<SemanticConfig>,
    #[serde(default = "default_max_pages")]
    max_pages: usize,
    #[serde(default)]
    pacing: PacingMode,
}

/// Validated configuration for one source. Read-only once built.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub sub_targets: Vec<String>,
    pub enabled: bool,
    pub shuffle: bool,
    pub intent_patterns: bool,
    pub extra_patterns: Vec<IntentPattern>,
    pub semantic: Option<SemanticConfig>,
    pub max_pages: usize,
    pub pacing: PacingMode,
}

impl SourceConfig {
    /// Minimal config for the given source; handy for tests and the CLI.
    pub fn new(kind: SourceKind, keywords: &[&str], sub_targets: &[&str]) -> Self {
        Self {
            kind,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            exclude_keywords: Vec::new(),
            sub_targets: sub_targets.iter().map(|s| s.to_string()).collect(),
            enabled: true,
            shuffle: false,
            intent_patterns: true,
            extra_patterns: Vec::new(),
            semantic: None,
            max_pages: DEFAULT_MAX_PAGES,
            pacing: PacingMode::None,
        }
    }

    fn from_raw(kind: SourceKind, raw: RawSource) -> Result<Self> {
        let keywords = clean_list(raw.keywords);
        let exclude_keywords = clean_list(raw.exclude_keywords);
        let sub_targets = clean_list(raw.sub_targets);

        let mut extra_patterns = Vec::with_capacity(raw.extra_patterns.len());
        for p in raw.extra_patterns {
            let id = p.id.trim();
            if id.is_empty() {
                bail!("{kind}: extra pattern without an id");
            }
            let compiled = IntentPattern::compile(id, &p.pattern)
                .with_context(|| format!("{kind}: invalid regex for pattern `{id}`"))?;
            extra_patterns.push(compiled);
        }

        if keywords.is_empty() && !raw.intent_patterns && extra_patterns.is_empty() {
            bail!("{kind}: nothing to match (no keywords and no patterns)");
        }
        if raw.enabled && sub_targets.is_empty() {
            bail!("{kind}: no sub-targets configured");
        }
        if raw.max_pages == 0 {
            bail!("{kind}: max_pages must be at least 1");
        }
        if let Some(sem) = raw.semantic {
            if !(-1.0..=1.0).contains(&sem.threshold) {
                bail!("{kind}: semantic threshold must be within [-1, 1]");
            }
            if keywords.is_empty() {
                bail!("{kind}: semantic matching needs keywords");
            }
        }

        Ok(Self {
            kind,
            keywords,
            exclude_keywords,
            sub_targets,
            enabled: raw.enabled,
            shuffle: raw.shuffle,
            intent_patterns: raw.intent_patterns,
            extra_patterns,
            semantic: raw.semantic,
            max_pages: raw.max_pages,
            pacing: raw.pacing,
        })
    }
}

/// All configured sources, keyed by kind.
#[derive(Debug, Clone, Default)]
pub struct KeywordConfig {
    sources: BTreeMap<SourceKind, SourceConfig>,
}

impl KeywordConfig {
    pub fn from_sources(sources: impl IntoIterator<Item = SourceConfig>) -> Self {
        Self {
            sources: sources.into_iter().map(|s| (s.kind, s)).collect(),
        }
    }

    pub fn get(&self, kind: SourceKind) -> Option<&SourceConfig> {
        self.sources.get(&kind)
    }

    /// Enabled sources in canonical order.
    pub fn enabled(&self) -> impl Iterator<Item = &SourceConfig> {
        SourceKind::ALL
            .iter()
            .filter_map(|k| self.sources.get(k))
            .filter(|s| s.enabled)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        let raw: BTreeMap<String, RawSource> = if hint_ext == "json" {
            serde_json::from_str(s).context("parsing keyword config as JSON")?
        } else {
            toml::from_str(s).context("parsing keyword config as TOML")?
        };

        let mut sources = BTreeMap::new();
        for (name, raw_src) in raw {
            let kind: SourceKind = name.parse()?;
            if sources.contains_key(&kind) {
                bail!("source `{kind}` configured twice");
            }
            sources.insert(kind, SourceConfig::from_raw(kind, raw_src)?);
        }
        Ok(Self { sources })
    }

    /// Load from an explicit path. `.json` is parsed as JSON, anything else as TOML.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading keyword config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::parse(&content, ext.as_str())
            .with_context(|| format!("invalid keyword config {}", path.display()))
    }

    /// Load using env var + fallbacks:
    /// 1) $KEYWORDS_PATH
    /// 2) config/keywords.toml
    /// 3) config/keywords.json
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        let toml_p = PathBuf::from("config/keywords.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from("config/keywords.json");
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Err(anyhow!("no keyword config found (set {ENV_PATH})"))
    }
}

/// Trim, drop empties, de-duplicate case-insensitively keeping first occurrence.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && seen.insert(t.to_lowercase()) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_list_keeps_order() {
        let out = clean_list(vec![
            " launch ".into(),
            "".into(),
            "MVP".into(),
            "Launch".into(),
            "mvp".into(),
        ]);
        assert_eq!(out, vec!["launch".to_string(), "MVP".to_string()]);
    }

    #[test]
    fn aliases_map_to_sub_targets() {
        let cfg = KeywordConfig::parse(
            r#"
            [bluesky]
            keywords = ["saas"]
            feeds = ["alice.bsky.social/startups"]
            pacing = "none"
            "#,
            "toml",
        )
        .unwrap();
        let b = cfg.get(SourceKind::Bluesky).unwrap();
        assert_eq!(b.sub_targets, vec!["alice.bsky.social/startups"]);
        assert_eq!(b.pacing, PacingMode::None);
        assert!(b.shuffle);
        assert_eq!(b.max_pages, DEFAULT_MAX_PAGES);
    }

    #[test]
    fn unknown_source_is_rejected() {
        assert!(KeywordConfig::parse("[myspace]\nkeywords=[\"a\"]\nsub_targets=[\"x\"]", "toml").is_err());
    }
}
