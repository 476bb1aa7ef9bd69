//! Text History ETL - Incremental staging of a message-history database
//!
//! A Rust library that mirrors a local iMessage-style `chat.db` into an
//! analytical SQLite database and incrementally derives text-analysis tables
//! from it.
//!
//! # Features
//!
//! - Read-only, table-by-table mirroring of the source database
//! - Declarative table specs validated in both directions against live databases
//! - Static reference tables loaded from delimited files
//! - Dependency-ordered staging builders that only ever append unseen rows
//! - Message tokenization with contraction, placeholder and abbreviation handling
//!   and part-of-speech tagging

/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Emoji recognition and catalogue
pub mod emoji;
/// Error types
pub mod error;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Source database mirroring
pub mod mirror;
/// Data models and structures
pub mod models;
/// Language capabilities: tokenizer, tagger and lexicon traits
pub mod nlp;
/// End-to-end pipeline runs
pub mod pipeline;
/// Rule-based part-of-speech tagging
pub mod pos;
/// Declarative table specifications
pub mod registry;
/// Database schema definitions
pub mod schema;
/// Staging table builders and their execution graph
pub mod staging;
/// Static reference tables
pub mod static_tables;
/// Message text to token stream
pub mod token_pipeline;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use config::AppConfig;
pub use db::Database;
pub use error::{EtlError, Result};
pub use mirror::SourceMirror;
pub use models::{BuildReport, MirrorReport, OutputFormat, RunSummary, TokenRecord, WriteMode};
pub use pipeline::Pipeline;
pub use registry::{SchemaRegistry, StagingTableDefinition, TableSpec, TableSpecSet};
pub use staging::{StagingBuilder, StagingGraph};
pub use static_tables::StaticTableLoader;
pub use token_pipeline::TokenPipeline;
