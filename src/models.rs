//! Data models for the staging pipeline
//!
//! This module contains the records produced by the token pipeline and the
//! reports returned by each pipeline stage.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A message as seen by the token pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageText<'a> {
    /// Stable message identifier
    pub id: i64,
    /// Raw message body
    pub text: &'a str,
}

/// One token of one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Message the token belongs to
    pub message_id: i64,
    /// 1-based position within the message
    pub token_idx: i64,
    /// Token surface form
    pub token: String,
    /// Fine-grained part-of-speech tag
    pub pos: String,
    /// Coarse universal part-of-speech tag
    pub pos_simple: String,
}

/// Descriptor of a distinct lowercased token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    /// Lowercased token
    pub token: String,
    /// Length in characters
    pub length: i64,
    /// Snowball stem
    pub stem: String,
    /// Dictionary form
    pub lemma: String,
    /// Token is a stopword
    pub is_stopword: bool,
    /// Token is only punctuation
    pub is_punct: bool,
    /// Token is an emoji
    pub is_emoji: bool,
}

/// How a staging table is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Only rows with an unseen natural key are appended
    #[default]
    Append,
    /// The table is dropped and rewritten on every run
    Replace,
}

impl WriteMode {
    /// Lowercase label used in logs and summaries
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Replace => "replace",
        }
    }
}

/// Output format for the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable log lines
    #[default]
    Text,
    /// A single JSON document
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("Invalid format: {other}. Must be one of: text, json")),
        }
    }
}

/// Result of copying one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCopy {
    /// Table name
    pub table: String,
    /// Rows copied
    pub rows: u64,
}

/// Result of mirroring a database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorReport {
    /// Tables copied, in copy order
    pub tables: Vec<TableCopy>,
    /// Virtual tables that were skipped
    pub skipped: Vec<String>,
}

impl MirrorReport {
    /// Total rows copied across all tables
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Result of building one staging table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Staging table name
    pub table: String,
    /// Write mode used
    pub mode: WriteMode,
    /// Upstream rows read
    pub input_rows: u64,
    /// Rows produced by the transform
    pub output_rows: u64,
    /// Rows dropped because their key was already present
    pub skipped_existing: u64,
    /// Rows written
    pub inserted: u64,
    /// Batches processed
    pub batches: u64,
    /// Wall time in milliseconds
    pub duration_ms: u128,
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Source mirrored into the working copy
    pub mirror: MirrorReport,
    /// Raw tables refreshed in the target
    pub raw_tables: Vec<TableCopy>,
    /// Static tables loaded
    pub static_tables: Vec<TableCopy>,
    /// Staging builds, in execution order
    pub builds: Vec<BuildReport>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "mirror: {} tables, {} rows",
            self.mirror.tables.len(),
            self.mirror.total_rows()
        )?;
        if !self.mirror.skipped.is_empty() {
            writeln!(f, "skipped: {}", self.mirror.skipped.join(", "))?;
        }
        for copy in self.raw_tables.iter().chain(&self.static_tables) {
            writeln!(f, "loaded {}: {} rows", copy.table, copy.rows)?;
        }
        for build in &self.builds {
            writeln!(
                f,
                "staged {} ({}): {} input, {} inserted, {} existing, {} batches, {} ms",
                build.table,
                build.mode.as_str(),
                build.input_rows,
                build.inserted,
                build.skipped_existing,
                build.batches,
                build.duration_ms
            )?;
        }
        Ok(())
    }
}
