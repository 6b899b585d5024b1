//! One-shot scan from the command line.
//!
//! ```text
//! scan-once [SOURCE] [--filter]
//! ```
//! Prints the matched posts as pretty JSON on stdout; source failures go to stderr.

use anyhow::{bail, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use social_listener::bootstrap::{build_service, init_tracing, load_keywords};
use social_listener::config::Settings;
use social_listener::SourceKind;

#[derive(Parser, Debug)]
#[command(name = "scan-once", about = "Run a single social-listening scan and print the matches", version)]
struct Args {
    /// Only scan this source (reddit, twitter, bluesky, youtube, instagram).
    ///
    /// All enabled sources are scanned when omitted.
    #[arg(value_parser = parse_source)]
    source: Option<SourceKind>,

    /// Run matched posts through the secondary relevance filter.
    #[arg(long)]
    filter: bool,
}

fn parse_source(s: &str) -> Result<SourceKind, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = Args::parse();
    let settings = Settings::from_env()?;
    let keywords = load_keywords(&settings)?;

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(target: "scan", "interrupted; cancelling scan");
            ctrl_c.cancel();
        }
    });

    let service = build_service(settings, keywords, shutdown)?;
    if let Some(kind) = args.source {
        if !service.is_configured(kind) {
            bail!("source `{kind}` is not enabled or has no credentials");
        }
    }

    let report = service.scan(args.source, args.filter).await?;
    for failure in &report.failures {
        eprintln!("warning: {} failed: {}", failure.source, failure.error);
    }
    println!("{}", serde_json::to_string_pretty(&report.posts)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("scan-once").chain(v.iter().copied()))
    }

    #[test]
    fn parses_source_and_filter() {
        let a = args(&["bsky", "--filter"]).unwrap();
        assert_eq!(a.source, Some(SourceKind::Bluesky));
        assert!(a.filter);

        let a = args(&[]).unwrap();
        assert!(a.source.is_none() && !a.filter);
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(args(&["myspace"]).is_err());
        assert!(args(&["--verbose"]).is_err());
        assert!(args(&["reddit", "twitter"]).is_err());
    }
}
