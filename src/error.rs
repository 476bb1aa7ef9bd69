//! Error types for the txt-history-etl library.
//!
//! This module provides custom error types using `thiserror` so that every
//! failure in the pipeline is reported with the table, column or path involved.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while running the staging pipeline.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Source or target database could not be opened
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    /// Declared schema and live schema diverge
    #[error(transparent)]
    SchemaMismatch(#[from] SchemaMismatch),

    /// A staging table depends on a table or view that does not exist yet
    #[error("Staging table '{table}' references missing tables or views: {}", .missing.join(", "))]
    MissingReference {
        /// Staging table whose build was aborted
        table: String,
        /// Every reference that could not be resolved
        missing: Vec<String>,
    },

    /// A builder produced columns that differ from its declared columnspec
    #[error(
        "Column contract violated for '{table}': missing [{}], unexpected [{}]",
        .missing.join(", "),
        .unexpected.join(", ")
    )]
    ColumnContract {
        /// Staging table being built
        table: String,
        /// Declared columns absent from the output
        missing: Vec<String>,
        /// Output columns absent from the declaration
        unexpected: Vec<String>,
    },

    /// Two definitions share a logical table name
    #[error("Table '{name}' is defined twice ({first} and {second})")]
    DuplicateDefinition {
        /// Duplicated table name
        name: String,
        /// Where the first definition came from
        first: String,
        /// Where the second definition came from
        second: String,
    },

    /// Staging references form a cycle
    #[error("Staging tables form a dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// Declared execution order runs a table before one of its references
    #[error("Staging table '{table}' is declared before its reference '{reference}'")]
    DependencyOrder {
        /// Table that is scheduled too early
        table: String,
        /// Staging table it depends on
        reference: String,
    },

    /// A table or builder definition is malformed
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// A static reference file is missing or malformed
    #[error("Static table '{table}' ({}): {reason}", .path.display())]
    StaticData {
        /// Static table name
        table: String,
        /// File backing the table
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// The injected tokenizer or tagger broke its contract
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Delimited file errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with `EtlError`
pub type Result<T> = std::result::Result<T, EtlError>;

impl From<anyhow::Error> for EtlError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Failure to open the source or target database.
#[derive(Error, Debug)]
pub enum ConnectivityError {
    /// The database file does not exist
    #[error("Database not found at {}", .0.display())]
    NotFound(PathBuf),

    /// The process may not read the database file
    #[error(
        "Permission denied reading {}. Grant your terminal Full Disk Access \
         (System Settings > Privacy & Security) or copy the file somewhere readable",
        .0.display()
    )]
    PermissionDenied(PathBuf),

    /// Mirroring a database onto itself would destroy the source
    #[error("Source and target are the same file: {}", .0.display())]
    SamePath(PathBuf),

    /// SQLite refused to open the file
    #[error("Failed to open database {}: {source}", .path.display())]
    Open {
        /// Database path
        path: PathBuf,
        /// Underlying SQLite error
        #[source]
        source: rusqlite::Error,
    },
}

/// A single difference between a declared schema and a live database.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Discrepancy {
    /// Declared table absent from the database
    MissingTable(String),
    /// Live table with no declaration
    UndeclaredTable(String),
    /// Declared column absent from the live table
    MissingColumn {
        /// Table name
        table: String,
        /// Column name
        column: String,
    },
    /// Live column with no declaration
    UndeclaredColumn {
        /// Table name
        table: String,
        /// Column name
        column: String,
    },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTable(table) => write!(f, "missing table '{table}'"),
            Self::UndeclaredTable(table) => write!(f, "undeclared table '{table}'"),
            Self::MissingColumn { table, column } => {
                write!(f, "missing column '{table}.{column}'")
            },
            Self::UndeclaredColumn { table, column } => {
                write!(f, "undeclared column '{table}.{column}'")
            },
        }
    }
}

/// Every discrepancy found by one schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMismatch {
    /// Name of the database or scope that was validated
    pub scope: String,
    /// All discrepancies, sorted
    pub discrepancies: Vec<Discrepancy>,
}

impl fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Schema mismatch in {} ({} discrepancies): ",
            self.scope,
            self.discrepancies.len()
        )?;
        for (i, discrepancy) in self.discrepancies.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{discrepancy}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaMismatch {}

impl SchemaMismatch {
    /// Tables declared but absent
    #[must_use]
    pub fn missing_tables(&self) -> Vec<&str> {
        self.discrepancies
            .iter()
            .filter_map(|d| match d {
                Discrepancy::MissingTable(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tables present but undeclared
    #[must_use]
    pub fn undeclared_tables(&self) -> Vec<&str> {
        self.discrepancies
            .iter()
            .filter_map(|d| match d {
                Discrepancy::UndeclaredTable(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_lists_every_discrepancy() {
        let mismatch = SchemaMismatch {
            scope: "working copy".to_string(),
            discrepancies: vec![
                Discrepancy::MissingTable("handle".to_string()),
                Discrepancy::UndeclaredColumn {
                    table: "message".to_string(),
                    column: "subject".to_string(),
                },
            ],
        };
        let text = mismatch.to_string();
        assert!(text.contains("2 discrepancies"));
        assert!(text.contains("missing table 'handle'"));
        assert!(text.contains("undeclared column 'message.subject'"));
        assert_eq!(mismatch.missing_tables(), vec!["handle"]);
        assert!(mismatch.undeclared_tables().is_empty());
    }

    #[test]
    fn test_permission_error_carries_hint() {
        let err = EtlError::from(ConnectivityError::PermissionDenied(PathBuf::from("/x/chat.db")));
        assert!(err.to_string().contains("Full Disk Access"));
    }
}
