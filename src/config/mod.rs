// src/config/mod.rs
// Process settings (environment) and the per-source keyword lists (file).

pub mod keywords;
pub mod settings;

pub use keywords::{KeywordConfig, PacingMode, SemanticConfig, SourceConfig};
pub use settings::Settings;
