// src/lib.rs
// Public library surface for the server, the CLI and integration tests.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod matcher;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod pacing;
pub mod retry;
pub mod scheduler;
pub mod secondary_filter;
pub mod session;
pub mod sources;
pub mod text;

/// Sent on every outbound request that does not need a platform-specific one.
pub const USER_AGENT: &str = concat!("social-listener/", env!("CARGO_PKG_VERSION"));

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::error::{ScanError, SourceFailure};
pub use crate::matcher::{MatchResult, MatcherChain};
pub use crate::model::{CanonicalPost, ScanWindow, SourceKind};
pub use crate::orchestrator::{ScanOrchestrator, ScanReport, ScanService};
pub use crate::sources::{SourceAdapter, SourceApi};
