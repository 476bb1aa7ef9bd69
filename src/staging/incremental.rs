//! The anti-join / transform / double-check / append algorithm shared by every
//! append-mode staging table, plus the replace-mode writer.

use std::collections::{HashMap, HashSet};

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::db::{quote_ident, table_exists};
use crate::error::{EtlError, Result};
use crate::registry::StagingTableDefinition;

/// Rows flowing between SQL and a builder's transform
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    /// Column names, in row order
    pub columns: Vec<String>,
    /// Row values, each as long as `columns`
    pub rows: Vec<Vec<Value>>,
}

impl RowBatch {
    /// Empty batch with the given columns
    #[must_use]
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(ToString::to_string).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; its width must match the columns
    pub fn push(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(EtlError::Other(format!(
                "row has {} values for {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Position of a column the caller cannot do without
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            EtlError::Other(format!(
                "expected column '{name}' in [{}]",
                self.columns.join(", ")
            ))
        })
    }

    fn key_indices(&self, key: &[&str]) -> Result<Vec<usize>> {
        key.iter().map(|k| self.require_column(k)).collect()
    }
}

/// Hashable form of a SQLite value, used to compare keys in memory
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    /// SQL NULL
    Null,
    /// 64-bit integer
    Integer(i64),
    /// IEEE-754 bits
    Real(u64),
    /// UTF-8 text
    Text(String),
    /// Raw bytes
    Blob(Vec<u8>),
}

impl From<&Value> for KeyValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Integer(i) => Self::Integer(*i),
            Value::Real(f) => Self::Real(f.to_bits()),
            Value::Text(s) => Self::Text(s.clone()),
            Value::Blob(b) => Self::Blob(b.clone()),
        }
    }
}

impl KeyValue {
    /// Back to a bindable SQLite value
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Integer(i) => Value::Integer(*i),
            Self::Real(bits) => Value::Real(f64::from_bits(*bits)),
            Self::Text(s) => Value::Text(s.clone()),
            Self::Blob(b) => Value::Blob(b.clone()),
        }
    }
}

fn row_key(row: &[Value], indices: &[usize]) -> Vec<KeyValue> {
    indices.iter().map(|&i| KeyValue::from(&row[i])).collect()
}

/// Query builder for "upstream rows whose natural key is not yet in the
/// destination", paged by distinct key.
///
/// Identifiers are quoted; cursor values and the page size are bound as
/// parameters. Rows with a NULL key component are never selected.
#[derive(Debug, Clone)]
pub struct AntiJoin<'a> {
    relation: &'a str,
    destination: &'a str,
    key: &'a [&'a str],
}

impl<'a> AntiJoin<'a> {
    /// `relation` is a quoted table name or a parenthesized `SELECT`
    #[must_use]
    pub const fn new(relation: &'a str, destination: &'a str, key: &'a [&'a str]) -> Self {
        Self {
            relation,
            destination,
            key,
        }
    }

    fn key_list(&self, alias: &str) -> String {
        let columns: Vec<String> = self
            .key
            .iter()
            .map(|k| format!("{alias}.{}", quote_ident(k)))
            .collect();
        columns.join(", ")
    }

    /// SQL for one page.
    ///
    /// Parameters: the cursor key values (when `after_cursor`), then the page
    /// size. The `NOT EXISTS` clause is left out while the destination table
    /// does not exist.
    #[must_use]
    pub fn page_sql(&self, destination_exists: bool, after_cursor: bool) -> String {
        let outer = self.key_list("s");
        let inner = self.key_list("s2");

        let mut conditions: Vec<String> = self
            .key
            .iter()
            .map(|k| format!("s2.{} IS NOT NULL", quote_ident(k)))
            .collect();

        if destination_exists {
            let matches: Vec<String> = self
                .key
                .iter()
                .map(|k| format!("d.{col} IS s2.{col}", col = quote_ident(k)))
                .collect();
            conditions.push(format!(
                "NOT EXISTS (SELECT 1 FROM {} AS d WHERE {})",
                quote_ident(self.destination),
                matches.join(" AND ")
            ));
        }

        let mut limit_param = 1;
        if after_cursor {
            let placeholders: Vec<String> = (1..=self.key.len()).map(|i| format!("?{i}")).collect();
            conditions.push(format!("({inner}) > ({})", placeholders.join(", ")));
            limit_param += self.key.len();
        }

        format!(
            "SELECT s.* FROM {rel} AS s WHERE ({outer}) IN (\
             SELECT DISTINCT {inner} FROM {rel} AS s2 WHERE {conds} \
             ORDER BY {inner} LIMIT ?{limit_param}) \
             ORDER BY {outer}",
            rel = self.relation,
            conds = conditions.join(" AND "),
        )
    }
}

/// Run a query and collect every row with its column names
pub fn read_rows(conn: &Connection, sql: &str, params: &[Value]) -> Result<RowBatch> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut batch = RowBatch {
        columns,
        rows: Vec::new(),
    };
    while let Some(row) = rows.next()? {
        let values = (0..width)
            .map(|i| row.get::<_, Value>(i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        batch.rows.push(values);
    }
    Ok(batch)
}

/// One page of new upstream rows, with what is needed to fetch the next
#[derive(Debug)]
pub struct Page {
    /// Upstream rows for up to `limit` distinct keys
    pub rows: RowBatch,
    /// Largest key in the page
    pub last_key: Option<Vec<Value>>,
    /// Distinct keys in the page
    pub distinct_keys: usize,
}

/// Fetch the page of upstream rows that follows `cursor`
pub fn fetch_page(
    conn: &Connection,
    anti_join: &AntiJoin<'_>,
    cursor: Option<&[Value]>,
    limit: usize,
) -> Result<Page> {
    let destination_exists = table_exists(conn, anti_join.destination)?;
    let sql = anti_join.page_sql(destination_exists, cursor.is_some());

    let mut params: Vec<Value> = cursor.map(<[Value]>::to_vec).unwrap_or_default();
    params.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));

    let rows = read_rows(conn, &sql, &params)?;
    let indices = rows.key_indices(anti_join.key)?;
    let distinct_keys = rows
        .rows
        .iter()
        .map(|r| row_key(r, &indices))
        .collect::<HashSet<_>>()
        .len();
    let last_key = rows
        .rows
        .last()
        .map(|r| indices.iter().map(|&i| r[i].clone()).collect());

    Ok(Page {
        rows,
        last_key,
        distinct_keys,
    })
}

/// Fail unless the produced columns are exactly the declared ones
pub fn check_columns(definition: &StagingTableDefinition, produced: &[String]) -> Result<()> {
    let declared: HashSet<&str> = definition.spec.column_names().into_iter().collect();
    let actual: HashSet<&str> = produced.iter().map(String::as_str).collect();

    let mut missing: Vec<String> = declared.difference(&actual).map(ToString::to_string).collect();
    let mut unexpected: Vec<String> = actual.difference(&declared).map(ToString::to_string).collect();
    if missing.is_empty() && unexpected.is_empty() && actual.len() == produced.len() {
        return Ok(());
    }
    missing.sort();
    unexpected.sort();
    if unexpected.is_empty() && missing.is_empty() {
        unexpected.push("duplicate column names".to_string());
    }
    Err(EtlError::ColumnContract {
        table: definition.name().to_string(),
        missing,
        unexpected,
    })
}

/// Drop rows whose natural key already exists in the destination.
///
/// Returns the remaining rows and how many were dropped.
pub fn filter_existing(
    conn: &Connection,
    destination: &str,
    key: &[&str],
    batch: RowBatch,
) -> Result<(RowBatch, u64)> {
    if batch.is_empty() || !table_exists(conn, destination)? {
        return Ok((batch, 0));
    }

    let indices = batch.key_indices(key)?;
    let conditions: Vec<String> = key
        .iter()
        .enumerate()
        .map(|(i, k)| format!("{} IS ?{}", quote_ident(k), i + 1))
        .collect();
    let sql = format!(
        "SELECT 1 FROM {} WHERE {} LIMIT 1",
        quote_ident(destination),
        conditions.join(" AND ")
    );
    let mut stmt = conn.prepare(&sql)?;

    let mut seen: HashMap<Vec<KeyValue>, bool> = HashMap::new();
    let RowBatch { columns, rows } = batch;
    let mut kept = Vec::with_capacity(rows.len());
    let mut skipped = 0u64;
    for row in rows {
        let key_values = row_key(&row, &indices);
        let exists = match seen.get(&key_values) {
            Some(exists) => *exists,
            None => {
                let bound: Vec<Value> = key_values.iter().map(KeyValue::to_value).collect();
                let exists = stmt
                    .query_row(params_from_iter(bound.iter()), |_| Ok(()))
                    .optional()?
                    .is_some();
                seen.insert(key_values, exists);
                exists
            },
        };
        if exists {
            skipped += 1;
        } else {
            kept.push(row);
        }
    }

    if skipped > 0 {
        warn!(table = destination, skipped, "Dropped rows whose key was already present");
    }
    Ok((RowBatch { columns, rows: kept }, skipped))
}

fn insert_sql(definition: &StagingTableDefinition) -> String {
    let names = definition.spec.column_names();
    let columns: Vec<String> = names.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        quote_ident(definition.name()),
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Write rows in declared column order; returns rows actually inserted
fn insert_rows(conn: &Connection, definition: &StagingTableDefinition, batch: &RowBatch) -> Result<u64> {
    let order = definition
        .spec
        .column_names()
        .into_iter()
        .map(|c| batch.require_column(c))
        .collect::<Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(&insert_sql(definition))?;
    let mut inserted = 0u64;
    for row in &batch.rows {
        let changed = stmt.execute(params_from_iter(order.iter().map(|&i| &row[i])))?;
        inserted += changed as u64;
    }
    Ok(inserted)
}

/// Result of appending one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Rows written
    pub inserted: u64,
    /// Rows dropped by the double-check
    pub skipped_existing: u64,
}

/// Validate, double-check and append one transformed batch in a transaction
pub fn append(
    conn: &mut Connection,
    definition: &StagingTableDefinition,
    key: &[&str],
    batch: RowBatch,
) -> Result<AppendOutcome> {
    check_columns(definition, &batch.columns)?;
    let (batch, skipped_existing) = filter_existing(conn, definition.name(), key, batch)?;

    let tx = conn.transaction()?;
    tx.execute_batch(&definition.create_table_sql())?;
    let inserted = insert_rows(&tx, definition, &batch)?;
    tx.commit()?;

    debug!(table = definition.name(), inserted, skipped_existing, "Appended batch");
    Ok(AppendOutcome {
        inserted,
        skipped_existing,
    })
}

/// Drop, recreate and fill a table in one transaction
pub fn replace(conn: &mut Connection, definition: &StagingTableDefinition, batch: &RowBatch) -> Result<u64> {
    check_columns(definition, &batch.columns)?;

    let tx = conn.transaction()?;
    tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(definition.name())))?;
    tx.execute_batch(&definition.create_table_sql())?;
    let inserted = insert_rows(&tx, definition, batch)?;
    tx.commit()?;

    debug!(table = definition.name(), inserted, "Replaced table");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WriteMode;
    use crate::registry::TableSpec;

    fn definition() -> StagingTableDefinition {
        let spec = TableSpec::new(
            "word",
            vec![("message_id", "INTEGER"), ("token", "TEXT"), ("pos", "TEXT")],
        )
        .expect("valid spec");
        StagingTableDefinition::new(spec, vec!["message_id".to_string()], vec![], WriteMode::Append)
            .expect("valid definition")
    }

    fn batch(rows: &[(i64, &str)]) -> RowBatch {
        let mut batch = RowBatch::new(&["message_id", "token", "pos"]);
        for (id, token) in rows {
            batch
                .push(vec![
                    Value::Integer(*id),
                    Value::Text((*token).to_string()),
                    Value::Text("NN".to_string()),
                ])
                .expect("row width");
        }
        batch
    }

    #[test]
    fn test_page_sql_shape() {
        let key = ["message_id"];
        let anti_join = AntiJoin::new("\"upstream\"", "word", &key);

        let first = anti_join.page_sql(false, false);
        assert!(!first.contains("NOT EXISTS"));
        assert!(first.contains("LIMIT ?1"));

        let next = anti_join.page_sql(true, true);
        assert!(next.contains("NOT EXISTS (SELECT 1 FROM \"word\" AS d"));
        assert!(next.contains("(s2.\"message_id\") > (?1)"));
        assert!(next.contains("LIMIT ?2"));
    }

    #[test]
    fn test_paging_walks_every_key_once() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE upstream (message_id INTEGER, text TEXT);
             INSERT INTO upstream VALUES (1, 'a'), (1, 'b'), (2, 'c'), (3, 'd'), (NULL, 'x');",
        )?;
        let key = ["message_id"];
        let anti_join = AntiJoin::new("\"upstream\"", "word", &key);

        let first = fetch_page(&conn, &anti_join, None, 2)?;
        assert_eq!(first.rows.len(), 3);
        assert_eq!(first.distinct_keys, 2);

        let cursor = first.last_key.expect("cursor");
        let second = fetch_page(&conn, &anti_join, Some(&cursor), 2)?;
        assert_eq!(second.rows.len(), 1);
        assert_eq!(second.last_key, Some(vec![Value::Integer(3)]));
        Ok(())
    }

    #[test]
    fn test_column_contract_names_both_sides() {
        let definition = definition();
        let produced = vec!["message_id".to_string(), "token".to_string(), "lemma".to_string()];
        match check_columns(&definition, &produced) {
            Err(EtlError::ColumnContract {
                table,
                missing,
                unexpected,
            }) => {
                assert_eq!(table, "word");
                assert_eq!(missing, vec!["pos"]);
                assert_eq!(unexpected, vec!["lemma"]);
            },
            other => panic!("expected column contract error, got {other:?}"),
        }
    }

    #[test]
    fn test_append_skips_existing_keys() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        let definition = definition();
        let key = ["message_id"];

        let first = append(&mut conn, &definition, &key, batch(&[(1, "hi"), (2, "yo")]))?;
        assert_eq!(first.inserted, 2);

        let second = append(&mut conn, &definition, &key, batch(&[(2, "yo"), (3, "hey")]))?;
        assert_eq!(second.inserted, 1);
        assert_eq!(second.skipped_existing, 1);
        Ok(())
    }

    #[test]
    fn test_replace_rewrites_table() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        let definition = definition();
        replace(&mut conn, &definition, &batch(&[(1, "a"), (2, "b")]))?;
        replace(&mut conn, &definition, &batch(&[(5, "z")]))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM word", [], |r| r.get(0))?;
        assert_eq!(count, 1);
        Ok(())
    }
}
