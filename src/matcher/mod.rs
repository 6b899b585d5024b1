// src/matcher/mod.rs
//! Matcher chain: exclusion → keywords → intent patterns → (optional) semantic.
//!
//! The lexical passes are pure and synchronous ([`MatcherChain::match_text`]).
//! [`MatcherChain::evaluate`] additionally runs the embedding stage for
//! sources that enable it, and only when the lexical passes produced a plain
//! miss.

pub mod patterns;
pub mod semantic;

use crate::config::keywords::SourceConfig;
use patterns::IntentPattern;
use semantic::SemanticStage;

/// Outcome of matching one piece of text.
///
/// A miss never carries a term; both constructors enforce it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchResult {
    matched: bool,
    term: String,
}

impl MatchResult {
    pub fn hit(term: impl Into<String>) -> Self {
        Self {
            matched: true,
            term: term.into(),
        }
    }

    pub fn miss() -> Self {
        Self::default()
    }

    pub fn matched(&self) -> bool {
        self.matched
    }

    /// Matched keyword or pattern id; empty on a miss.
    pub fn term(&self) -> &str {
        &self.term
    }
}

/// Internal lexical verdict; `Excluded` must also stop the semantic stage.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Lexical {
    Excluded(String),
    Hit(String),
    Miss,
}

pub struct MatcherChain {
    /// (lowercased, as configured)
    keywords: Vec<(String, String)>,
    excludes: Vec<String>,
    patterns: Vec<IntentPattern>,
    semantic: Option<SemanticStage>,
}

impl MatcherChain {
    pub fn new(keywords: &[String], exclude_keywords: &[String], patterns: Vec<IntentPattern>) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| (k.to_lowercase(), k.clone()))
                .filter(|(lower, _)| !lower.is_empty())
                .collect(),
            excludes: exclude_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            patterns,
            semantic: None,
        }
    }

    /// Build the chain for one source: built-in intents (if enabled) followed
    /// by the source's extra patterns.
    pub fn from_config(cfg: &SourceConfig) -> Self {
        let mut pats: Vec<IntentPattern> = Vec::new();
        if cfg.intent_patterns {
            pats.extend(patterns::builtin().iter().cloned());
        }
        pats.extend(cfg.extra_patterns.iter().cloned());
        Self::new(&cfg.keywords, &cfg.exclude_keywords, pats)
    }

    pub fn with_semantic(mut self, stage: SemanticStage) -> Self {
        self.semantic = Some(stage);
        self
    }

    pub fn has_semantic(&self) -> bool {
        self.semantic.is_some()
    }

    fn lexical(&self, text: &str) -> Lexical {
        let lower = text.to_lowercase();

        if let Some(ex) = self.excludes.iter().find(|ex| lower.contains(ex.as_str())) {
            return Lexical::Excluded(ex.clone());
        }

        if let Some((_, literal)) = self
            .keywords
            .iter()
            .find(|(kw, _)| lower.contains(kw.as_str()))
        {
            return Lexical::Hit(literal.clone());
        }

        // Raw text: the patterns carry the case-insensitive flag themselves.
        if let Some(p) = self.patterns.iter().find(|p| p.re.is_match(text)) {
            return Lexical::Hit(p.id.clone());
        }

        Lexical::Miss
    }

    /// Lexical chain only. Pure and deterministic.
    pub fn match_text(&self, text: &str) -> MatchResult {
        match self.lexical(text) {
            Lexical::Hit(term) => MatchResult::hit(term),
            Lexical::Excluded(_) | Lexical::Miss => MatchResult::miss(),
        }
    }

    /// Full chain including the semantic stage when configured.
    pub async fn evaluate(&self, text: &str) -> MatchResult {
        match self.lexical(text) {
            Lexical::Hit(term) => MatchResult::hit(term),
            Lexical::Excluded(ex) => {
                tracing::trace!(target: "matcher", exclude = %ex, "excluded");
                MatchResult::miss()
            }
            Lexical::Miss => match &self.semantic {
                Some(stage) => stage.evaluate(text).await,
                None => MatchResult::miss(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(kw: &[&str], ex: &[&str]) -> MatcherChain {
        let kw: Vec<String> = kw.iter().map(|s| s.to_string()).collect();
        let ex: Vec<String> = ex.iter().map(|s| s.to_string()).collect();
        MatcherChain::new(&kw, &ex, patterns::builtin().to_vec())
    }

    #[test]
    fn exclusion_overrides_keyword_and_pattern() {
        let c = chain(&["launch"], &["giveaway"]);
        let r = c.match_text("What are you building? Launch GIVEAWAY today");
        assert!(!r.matched());
        assert_eq!(r.term(), "");
    }

    #[test]
    fn keyword_returns_literal_as_configured() {
        let c = chain(&["Product Hunt", "launch"], &[]);
        let r = c.match_text("we are on product hunt and we launch today");
        assert!(r.matched());
        assert_eq!(r.term(), "Product Hunt");
    }

    #[test]
    fn keyword_precedes_pattern() {
        let c = chain(&["mvp"], &[]);
        let r = c.match_text("What are you building? My MVP is live");
        assert_eq!(r.term(), "mvp");
    }

    #[test]
    fn pattern_returns_identifier_not_regex() {
        let c = chain(&["launch"], &[]);
        let r = c.match_text("Honestly, what's holding you back?");
        assert!(r.matched());
        assert_eq!(r.term(), "question:holding_you_back");
    }

    #[test]
    fn empty_terms_are_ignored() {
        let c = chain(&[""], &[""]);
        assert!(!c.match_text("anything at all").matched());
    }
}
