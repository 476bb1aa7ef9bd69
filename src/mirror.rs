//! Verbatim table copies from the source message database.
//!
//! The source is only ever opened read-only. [`SourceMirror::copy`] rebuilds
//! the working copy from scratch; [`refresh_tables`] drops and recopies a
//! chosen set of tables into the persistent analytical database.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use tracing::{debug, info, instrument, warn};

use crate::db::{list_table_definitions, quote_ident, TableDefinition};
use crate::error::{ConnectivityError, Discrepancy, EtlError, Result, SchemaMismatch};
use crate::logging::OperationTimer;
use crate::metrics::PipelineMetrics;
use crate::models::{MirrorReport, TableCopy};

/// Copies every user table of a source database into a fresh file
#[derive(Default)]
pub struct SourceMirror {
    metrics: PipelineMetrics,
}

impl SourceMirror {
    /// Create a new mirror
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recreate `target` as a table-by-table copy of `source`
    #[instrument(skip_all, fields(source = %source.display(), target = %target.display()))]
    pub fn copy(&self, source: &Path, target: &Path) -> Result<MirrorReport> {
        let timer = OperationTimer::new("mirror");
        check_access(source)?;
        if same_file(source, target) {
            return Err(ConnectivityError::SamePath(source.to_path_buf()).into());
        }

        let src = open_read_only(source)?;
        remove_database(target)?;
        let mut dst = open_read_write(target)?;

        let mut report = MirrorReport::default();
        let definitions = list_table_definitions(&src)?;
        let skipped = skipped_tables(&definitions);

        for definition in &definitions {
            if skipped.contains(&definition.name) {
                continue;
            }
            let rows = copy_table(&src, &mut dst, definition, false)?;
            self.metrics.record_table_mirrored(&definition.name, rows);
            debug!(table = definition.name.as_str(), rows, "Mirrored table");
            report.tables.push(TableCopy {
                table: definition.name.clone(),
                rows,
            });
        }
        report.skipped = skipped;

        info!(
            tables = report.tables.len(),
            rows = report.total_rows(),
            skipped = report.skipped.len(),
            duration_ms = timer.elapsed_ms(),
            "Mirrored source database"
        );
        Ok(report)
    }
}

/// Drop and recopy the named tables from `source` into `target`
pub fn refresh_tables(source: &Connection, target: &mut Connection, tables: &[&str]) -> Result<Vec<TableCopy>> {
    let metrics = PipelineMetrics::default();
    let definitions = list_table_definitions(source)?;

    let mut copies = Vec::with_capacity(tables.len());
    for &table in tables {
        let definition = definitions.iter().find(|d| d.name == table).ok_or_else(|| {
            EtlError::from(SchemaMismatch {
                scope: "working copy".to_string(),
                discrepancies: vec![Discrepancy::MissingTable(table.to_string())],
            })
        })?;
        let rows = copy_table(source, target, definition, true)?;
        metrics.record_table_mirrored(table, rows);
        copies.push(TableCopy {
            table: table.to_string(),
            rows,
        });
    }
    info!(tables = copies.len(), "Refreshed raw tables");
    Ok(copies)
}

/// Open a database without any write access
pub fn open_read_only(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|source| ConnectivityError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    conn.execute_batch("PRAGMA query_only = ON")?;
    Ok(conn)
}

fn open_read_write(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Connection::open(path).map_err(|source| {
        ConnectivityError::Open {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// Distinguish a missing file from one the process may not read
fn check_access(path: &Path) -> Result<()> {
    match File::open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(ConnectivityError::NotFound(path.to_path_buf()).into())
        },
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            Err(ConnectivityError::PermissionDenied(path.to_path_buf()).into())
        },
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn same_file(source: &Path, target: &Path) -> bool {
    let Ok(source) = fs::canonicalize(source) else {
        return false;
    };
    resolve(target) == source
}

/// Canonical form of a path whose file may not exist yet
fn resolve(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

/// Delete a database file and its WAL/SHM siblings
fn remove_database(path: &Path) -> Result<()> {
    let mut files = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut sibling = path.as_os_str().to_owned();
        sibling.push(suffix);
        files.push(PathBuf::from(sibling));
    }
    for file in files {
        match fs::remove_file(&file) {
            Ok(()) => debug!(path = %file.display(), "Removed previous copy"),
            Err(e) if e.kind() == ErrorKind::NotFound => {},
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Virtual tables and the shadow tables that back them
fn skipped_tables(definitions: &[TableDefinition]) -> Vec<String> {
    let virtual_tables: Vec<&str> = definitions
        .iter()
        .filter(|d| d.is_virtual())
        .map(|d| d.name.as_str())
        .collect();

    let mut skipped = Vec::new();
    for definition in definitions {
        let shadow = virtual_tables
            .iter()
            .any(|v| definition.name.starts_with(&format!("{v}_")));
        if definition.is_virtual() {
            warn!(table = definition.name.as_str(), "Skipping virtual table");
            skipped.push(definition.name.clone());
        } else if shadow {
            debug!(table = definition.name.as_str(), "Skipping virtual table storage");
            skipped.push(definition.name.clone());
        }
    }
    skipped
}

/// Replay the `CREATE TABLE` and stream every row, in one transaction
fn copy_table(
    src: &Connection,
    dst: &mut Connection,
    definition: &TableDefinition,
    drop_existing: bool,
) -> Result<u64> {
    let table = quote_ident(&definition.name);
    let mut select = src.prepare(&format!("SELECT * FROM {table}"))?;
    let width = select.column_count();

    let tx = dst.transaction()?;
    if drop_existing {
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {table}"))?;
    }
    tx.execute_batch(&definition.sql)?;

    let mut copied = 0u64;
    {
        let placeholders: Vec<String> = (1..=width).map(|i| format!("?{i}")).collect();
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {table} VALUES ({})",
            placeholders.join(", ")
        ))?;
        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let values = (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            insert.execute(params_from_iter(values.iter()))?;
            copied += 1;
        }
    }
    tx.commit()?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_remove_database_clears_siblings() -> Result<()> {
        let dir = tempdir()?;
        let db = dir.path().join("copy.db");
        for name in ["copy.db", "copy.db-wal", "copy.db-shm"] {
            fs::write(dir.path().join(name), b"x")?;
        }
        remove_database(&db)?;
        assert!(!db.exists());
        assert!(!dir.path().join("copy.db-wal").exists());
        // a second removal is a no-op
        remove_database(&db)?;
        Ok(())
    }

    #[test]
    fn test_same_file_detects_relative_paths() -> Result<()> {
        let dir = tempdir()?;
        let db = dir.path().join("chat.db");
        fs::write(&db, b"")?;
        let indirect = dir.path().join(".").join("chat.db");
        assert!(same_file(&db, &indirect));
        assert!(!same_file(&db, &dir.path().join("other.db")));
        Ok(())
    }

    #[test]
    fn test_virtual_tables_and_shadows_are_skipped() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE message (ROWID INTEGER PRIMARY KEY, text TEXT);
             CREATE VIRTUAL TABLE search USING fts5(body);",
        )?;
        let skipped = skipped_tables(&list_table_definitions(&conn)?);
        assert!(skipped.contains(&"search".to_string()));
        assert!(skipped.iter().any(|t| t.starts_with("search_")));
        assert!(!skipped.contains(&"message".to_string()));
        Ok(())
    }
}
