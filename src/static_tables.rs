//! User-maintained reference tables loaded from delimited files.
//!
//! Every static table `t` is backed by `<directory>/t.csv`. The header row
//! must name exactly the declared columns (in any order); empty fields are
//! stored as NULL. Each load drops and rewrites the table.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

use crate::db::quote_ident;
use crate::error::{EtlError, Result};
use crate::models::TableCopy;
use crate::registry::{TableSpec, TableSpecSet};

const EXTENSION: &str = "csv";

/// Loads static tables from a directory of delimited files
#[derive(Debug, Clone)]
pub struct StaticTableLoader {
    directory: PathBuf,
    delimiter: u8,
}

impl StaticTableLoader {
    /// Create a loader for `directory`
    pub fn new(directory: impl Into<PathBuf>, delimiter: u8) -> Self {
        Self {
            directory: directory.into(),
            delimiter,
        }
    }

    /// File backing a static table
    #[must_use]
    pub fn path_for(&self, table: &str) -> PathBuf {
        self.directory.join(format!("{table}.{EXTENSION}"))
    }

    /// Load every declared static table, rejecting files with no declaration
    pub fn load_all(&self, conn: &mut Connection, specs: &TableSpecSet) -> Result<Vec<TableCopy>> {
        for path in self.data_files()? {
            let declared = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| specs.get(stem).is_some());
            if !declared {
                return Err(EtlError::StaticData {
                    table: path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    path,
                    reason: "file has no static table declaration".to_string(),
                });
            }
        }

        let mut loaded = Vec::with_capacity(specs.len());
        for spec in specs.iter() {
            let rows = self.load_table(conn, spec)?;
            loaded.push(TableCopy {
                table: spec.name().to_string(),
                rows,
            });
        }
        info!(tables = loaded.len(), "Loaded static tables");
        Ok(loaded)
    }

    /// Replace one static table with the contents of its file
    pub fn load_table(&self, conn: &mut Connection, spec: &TableSpec) -> Result<u64> {
        let path = self.path_for(spec.name());
        let fail = |reason: String| EtlError::StaticData {
            table: spec.name().to_string(),
            path: path.clone(),
            reason,
        };
        if !path.is_file() {
            return Err(fail("file not found".to_string()));
        }

        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(Trim::Headers)
            .from_path(&path)
            .map_err(|e| fail(e.to_string()))?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| fail(e.to_string()))?
            .iter()
            .map(ToString::to_string)
            .collect();
        check_headers(spec, &headers).map_err(fail)?;

        // Position of each declared column within a record
        let order: Vec<usize> = spec
            .column_names()
            .iter()
            .filter_map(|c| headers.iter().position(|h| h == c))
            .collect();

        let mut rows: Vec<Vec<Value>> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| fail(e.to_string()))?;
            let values = order
                .iter()
                .map(|&i| match record.get(i) {
                    Some(field) if !field.is_empty() => Value::Text(field.to_string()),
                    _ => Value::Null,
                })
                .collect();
            rows.push(values);
        }

        let table = quote_ident(spec.name());
        let columns: Vec<String> = spec.column_names().iter().map(|c| quote_ident(c)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();

        let tx = conn.transaction()?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {table}"))?;
        tx.execute_batch(&spec.create_table_sql(&[]))?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            ))?;
            for row in &rows {
                insert.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;

        debug!(table = spec.name(), rows = rows.len(), "Loaded static table");
        Ok(rows.len() as u64)
    }

    /// `*.csv` files in the directory, extension matched exactly; a missing directory holds none
    fn data_files(&self) -> Result<Vec<PathBuf>> {
        if !self.directory.is_dir() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&self.directory)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| has_extension(path))
            .collect();
        files.sort();
        Ok(files)
    }
}

fn has_extension(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext == EXTENSION)
}

/// Header row must name exactly the declared columns
fn check_headers(spec: &TableSpec, headers: &[String]) -> std::result::Result<(), String> {
    let declared: HashSet<&str> = spec.column_names().into_iter().collect();
    let present: HashSet<&str> = headers.iter().map(String::as_str).collect();
    if present.len() != headers.len() {
        return Err("header repeats a column".to_string());
    }

    let mut missing: Vec<&str> = declared.difference(&present).copied().collect();
    let mut unexpected: Vec<&str> = present.difference(&declared).copied().collect();
    if missing.is_empty() && unexpected.is_empty() {
        return Ok(());
    }
    missing.sort_unstable();
    unexpected.sort_unstable();
    Err(format!(
        "header mismatch: missing [{}], unexpected [{}]",
        missing.join(", "),
        unexpected.join(", ")
    ))
}
