// tests/keywords_config.rs
//
// Keyword config loading (TOML / JSON) and validation.
//
// Covered:
// - the shipped config/keywords.toml parses and enables the expected sources
// - JSON with platform-specific aliases, defaults, de-duplication
// - invalid regex, empty sources, bad thresholds are rejected with context
// - KEYWORDS_PATH env override (serialised: touches process env)

use std::io::Write as _;

use serial_test::serial;

use social_listener::config::keywords::{DEFAULT_MAX_PAGES, ENV_PATH};
use social_listener::config::{KeywordConfig, PacingMode};
use social_listener::model::SourceKind;

#[test]
fn shipped_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/keywords.toml");
    let cfg = KeywordConfig::load_from(&path).expect("shipped config must parse");

    let enabled: Vec<SourceKind> = cfg.enabled().map(|s| s.kind).collect();
    assert_eq!(
        enabled,
        vec![
            SourceKind::Reddit,
            SourceKind::Twitter,
            SourceKind::Bluesky,
            SourceKind::YouTube
        ]
    );
    let yt = cfg.get(SourceKind::YouTube).expect("youtube");
    assert!(!yt.intent_patterns);
    assert_eq!(yt.max_pages, 3);
    assert!(cfg.get(SourceKind::Bluesky).and_then(|b| b.semantic).is_some());
}

#[test]
fn json_with_aliases_and_defaults() {
    let cfg = KeywordConfig::parse(
        r#"{
            "reddit": {
                "subreddits": ["SaaS", "saas", " startups "],
                "keywords": ["CRM", "crm", "invoice tool"],
                "exclude_keywords": ["hiring"]
            },
            "instagram": {
                "accounts": ["buildspace"],
                "keywords": ["link?"],
                "shuffle": false,
                "pacing": "none",
                "max_pages": 2
            }
        }"#,
        "json",
    )
    .expect("valid json");

    let r = cfg.get(SourceKind::Reddit).expect("reddit");
    assert_eq!(r.sub_targets, vec!["SaaS", "startups"]);
    assert_eq!(r.keywords, vec!["CRM", "invoice tool"]);
    assert!(r.enabled && r.shuffle && r.intent_patterns);
    assert_eq!(r.max_pages, DEFAULT_MAX_PAGES);
    assert_eq!(r.pacing, PacingMode::Jittered);

    let ig = cfg.get(SourceKind::Instagram).expect("instagram");
    assert!(!ig.shuffle);
    assert_eq!(ig.pacing, PacingMode::None);
    assert_eq!(ig.max_pages, 2);
}

#[test]
fn invalid_configs_are_rejected() {
    let cases = [
        (
            "bad regex",
            r#"[reddit]
            subreddits = ["a"]
            extra_patterns = [{ id = "x", pattern = "(unclosed" }]"#,
            "invalid regex",
        ),
        (
            "nothing to match",
            r#"[reddit]
            subreddits = ["a"]
            intent_patterns = false"#,
            "nothing to match",
        ),
        (
            "no sub-targets",
            r#"[twitter]
            keywords = ["a"]"#,
            "no sub-targets",
        ),
        (
            "threshold",
            r#"[bluesky]
            feeds = ["a/b"]
            keywords = ["a"]
            semantic = { threshold = 1.5 }"#,
            "threshold",
        ),
        (
            "zero pages",
            r#"[youtube]
            channels = ["UC1"]
            keywords = ["a"]
            max_pages = 0"#,
            "max_pages",
        ),
        (
            "unknown field",
            r#"[reddit]
            subreddits = ["a"]
            keyword = ["typo"]"#,
            "unknown field",
        ),
    ];
    for (name, toml, needle) in cases {
        let err = KeywordConfig::parse(toml, "toml").expect_err(name);
        let msg = format!("{err:#}");
        assert!(msg.contains(needle), "{name}: {msg}");
    }
}

#[test]
fn disabled_source_may_omit_sub_targets() {
    let cfg = KeywordConfig::parse(
        r#"
        [instagram]
        enabled = false
        keywords = ["a"]
        "#,
        "toml",
    )
    .expect("disabled source is fine");
    assert_eq!(cfg.enabled().count(), 0);
    assert!(!cfg.is_empty());
}

#[test]
#[serial]
fn env_path_overrides_default_location() {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("tempfile");
    write!(
        file,
        r#"{{"bluesky": {{"feeds": ["alice.bsky.social/startups"], "keywords": ["saas"]}}}}"#
    )
    .expect("write");

    std::env::set_var(ENV_PATH, file.path());
    let cfg = KeywordConfig::load_default();
    std::env::remove_var(ENV_PATH);

    let cfg = cfg.expect("load via env");
    assert_eq!(cfg.enabled().count(), 1);
    assert!(cfg.get(SourceKind::Bluesky).is_some());
}

#[test]
#[serial]
fn env_path_to_missing_file_is_an_error() {
    std::env::set_var(ENV_PATH, "/definitely/not/here/keywords.toml");
    let res = KeywordConfig::load_default();
    std::env::remove_var(ENV_PATH);
    assert!(res.is_err());
}
