//! Index build and query engine for tagged note collections.
//!
//! Builds tag-membership and TF-IDF relations in SQLite from an ordered note
//! corpus, and answers boolean tag expressions, natural-language phrases, and
//! composite `text tags: expression` queries with ordered note identifiers.

pub mod config;
pub mod db;
pub mod index;
pub mod logging;
pub mod model;
pub mod query;
pub mod text;

pub use config::{ConfigError, EngineConfig, StemLanguage};
pub use index::builder::IndexBuilder;
pub use index::reader::{IndexReader, TagCount};
pub use index::{BuildError, BuildReport};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::note::{validate_tag, CorpusNote, NoteId, NoteValidationError, UNIVERSAL_TAG};
pub use query::ast::Expr;
pub use query::boolean::TagQueryEngine;
pub use query::relevance::{RelevanceQueryEngine, ScoredNote};
pub use query::router::{QueryOutcome, QueryRouter};
pub use query::{QueryError, QueryResult};
pub use text::TextNormalizer;

/// Minimal health-check API for linkage checks.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
