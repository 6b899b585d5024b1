// src/text.rs
// Small text helpers shared by the platform clients and logging.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Short, non-reversible fingerprint of a text, safe to put in logs.
pub fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_BR: OnceCell<Regex> = OnceCell::new();
    let re_br = RE_BR.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
    out = re_br.replace_all(&out, " ").to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
