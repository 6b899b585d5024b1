// tests/session_store.rs
//
// File-backed SessionStore on a temp dir.
//
// Covered:
// - save -> load round-trip through `<dir>/<source>_session.json`
// - age-based expiry against an explicit clock, with per-source max age
// - invalidate removes the file; corrupt files read as absent
// - sources do not share records or locks

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use social_listener::session::{FileBackend, SessionCredential, SessionPolicy, SessionStore};

fn policy(secs: u64) -> SessionPolicy {
    SessionPolicy {
        max_age: Duration::from_secs(secs),
        jitter: Duration::ZERO,
    }
}

#[tokio::test]
async fn file_round_trip_keeps_payload_and_timestamp() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionStore::file(dir.path());
    let cred = SessionCredential::new(json!({
        "token": "abc",
        "refresh": "r-1",
        "did": "did:plc:xyz"
    }));

    store.save("bluesky", &cred).await.expect("save");
    let file = FileBackend::new(dir.path()).path_for("bluesky");
    assert!(file.ends_with("bluesky_session.json"));
    assert!(file.exists());
    assert!(!file.with_extension("json.tmp").exists(), "temp file renamed away");

    let back = store.load("bluesky").await.expect("fresh record");
    assert_eq!(back, cred);

    // a second store over the same dir sees it too (survives restarts)
    let reopened = SessionStore::file(dir.path());
    assert_eq!(reopened.load("bluesky").await, Some(cred));
}

#[tokio::test]
async fn records_older_than_max_age_are_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionStore::file(dir.path());
    assert_eq!(store.register("reddit", policy(3600)), Duration::from_secs(3600));

    let mut cred = SessionCredential::new(json!({ "token": "t" }));
    cred.refreshed_at = Utc::now() - ChronoDuration::minutes(30);
    store.save("reddit", &cred).await.expect("save");

    let now = Utc::now();
    assert!(store.load_at("reddit", now).await.is_some());
    assert!(store
        .load_at("reddit", now + ChronoDuration::minutes(31))
        .await
        .is_none());
}

#[tokio::test]
async fn jitter_is_pinned_per_source() {
    let store = SessionStore::in_memory();
    let p = SessionPolicy {
        max_age: Duration::from_secs(100),
        jitter: Duration::from_secs(50),
    };
    let resolved = store.register("instagram", p);
    assert!(resolved >= Duration::from_secs(100) && resolved <= Duration::from_secs(150));
    for _ in 0..10 {
        assert_eq!(store.effective_max_age("instagram"), resolved);
    }
}

#[tokio::test]
async fn invalidate_removes_the_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionStore::file(dir.path());
    store
        .save("twitter", &SessionCredential::new(json!({ "token": "t" })))
        .await
        .expect("save");

    store.invalidate("twitter").await.expect("invalidate");
    assert!(store.load("twitter").await.is_none());
    assert!(!FileBackend::new(dir.path()).path_for("twitter").exists());
    store.invalidate("twitter").await.expect("second invalidate is a no-op");
}

#[tokio::test]
async fn corrupt_file_reads_as_absent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = FileBackend::new(dir.path()).path_for("reddit");
    std::fs::write(&path, b"{\"payload\": ").expect("write garbage");

    let store = SessionStore::file(dir.path());
    assert!(store.load("reddit").await.is_none());
}

#[tokio::test]
async fn sources_are_independent_under_concurrency() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SessionStore::file(dir.path()));

    let mut tasks = Vec::new();
    for source in ["reddit", "twitter", "bluesky", "instagram"] {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..20 {
                let cred = SessionCredential::new(json!({ "token": format!("{source}-{i}") }));
                store.save(source, &cred).await.expect("save");
                let back = store.load(source).await.expect("load");
                assert!(back.token().is_some_and(|t| t.starts_with(source)));
            }
        }));
    }
    for t in tasks {
        t.await.expect("task");
    }

    for source in ["reddit", "twitter", "bluesky", "instagram"] {
        let last = store.load(source).await.expect("final record");
        assert_eq!(last.token(), Some(format!("{source}-19").as_str()));
    }
}
