//! Declarative table specifications and their validation against live databases.
//!
//! Three JSON files describe every table the pipeline knows about:
//!
//! - raw tables: `{"table": {"column": "TYPE", ...}, ...}`, mirrored from the source
//! - static tables: same shape, loaded from flat files
//! - staging tables: `{"table": {"columnspec": {...}, "primary_key": "col" | ["a", "b"],
//!   "references": [...] | null, "write_mode": "append" | "replace"}}`
//!
//! Key order is preserved and duplicate keys are reported instead of being
//! silently collapsed, so a table declared twice fails at load time before any
//! database is opened.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;

use rusqlite::Connection;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::SchemaConfig;
use crate::db::{list_tables, quote_ident, table_columns};
use crate::error::{Discrepancy, EtlError, Result, SchemaMismatch};
use crate::models::WriteMode;
use crate::validation::InputValidator;

/// JSON object decoded as an ordered list of entries, duplicates included
struct Entries<T>(Vec<(String, T)>);

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Entries<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
            type Value = Entries<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, T>()? {
                    entries.push((key, value));
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeySpec {
    One(String),
    Many(Vec<String>),
}

impl KeySpec {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(column) => vec![column],
            Self::Many(columns) => columns,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StagingEntry {
    columnspec: Entries<String>,
    primary_key: KeySpec,
    #[serde(default)]
    references: Option<Vec<String>>,
    #[serde(default)]
    write_mode: WriteMode,
}

/// A declared column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Declared SQL type
    pub declared_type: String,
}

/// Declared shape of one table: name plus ordered columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    name: String,
    columns: Vec<ColumnDef>,
}

impl TableSpec {
    /// Build a spec, rejecting invalid identifiers, empty column sets and duplicate columns
    pub fn new<N, C, T>(name: N, columns: impl IntoIterator<Item = (C, T)>) -> Result<Self>
    where
        N: Into<String>,
        C: Into<String>,
        T: Into<String>,
    {
        let name = name.into();
        InputValidator::validate_identifier(&name)
            .map_err(|e| EtlError::InvalidDefinition(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut defs = Vec::new();
        for (column, declared) in columns {
            let column = column.into();
            let declared_type = declared.into();
            InputValidator::validate_identifier(&column)
                .and_then(|()| InputValidator::validate_declared_type(&column, &declared_type))
                .map_err(|e| EtlError::InvalidDefinition(format!("table '{name}': {e}")))?;
            if !seen.insert(column.to_ascii_lowercase()) {
                return Err(EtlError::InvalidDefinition(format!(
                    "table '{name}' declares column '{column}' twice"
                )));
            }
            defs.push(ColumnDef {
                name: column,
                declared_type,
            });
        }

        if defs.is_empty() {
            return Err(EtlError::InvalidDefinition(format!(
                "table '{name}' declares no columns"
            )));
        }

        Ok(Self {
            name,
            columns: defs,
        })
    }

    /// Table name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared columns in order
    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Declared column names in order
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Whether a column is declared
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }

    /// `CREATE TABLE` statement for this spec with an optional primary key
    #[must_use]
    pub fn create_table_sql(&self, primary_key: &[String]) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.declared_type))
            .collect();
        if !primary_key.is_empty() {
            let keys: Vec<String> = primary_key.iter().map(|k| quote_ident(k)).collect();
            parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            parts.join(", ")
        )
    }
}

/// Named collection of table specs, in declaration order
#[derive(Debug, Clone, Default)]
pub struct TableSpecSet {
    specs: Vec<TableSpec>,
    index: HashMap<String, usize>,
}

impl TableSpecSet {
    /// Build a set, failing on duplicate names
    pub fn new(specs: impl IntoIterator<Item = TableSpec>, origin: &str) -> Result<Self> {
        let mut set = Self::default();
        for spec in specs {
            if set.index.contains_key(spec.name()) {
                return Err(EtlError::DuplicateDefinition {
                    name: spec.name().to_string(),
                    first: origin.to_string(),
                    second: origin.to_string(),
                });
            }
            set.index.insert(spec.name().to_string(), set.specs.len());
            set.specs.push(spec);
        }
        Ok(set)
    }

    /// Look up a spec by table name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TableSpec> {
        self.index.get(name).map(|&i| &self.specs[i])
    }

    /// Iterate specs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &TableSpec> {
        self.specs.iter()
    }

    /// Declared table names in order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(TableSpec::name).collect()
    }

    /// Number of specs
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Parse a `{table: {column: type}}` JSON document
    pub fn from_json(json: &str, origin: &str) -> Result<Self> {
        let entries: Entries<Entries<String>> = serde_json::from_str(json)?;
        let specs = entries
            .0
            .into_iter()
            .map(|(table, columns)| TableSpec::new(table, columns.0))
            .collect::<Result<Vec<_>>>()?;
        Self::new(specs, origin)
    }
}

/// Declaration of one staging table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingTableDefinition {
    /// Columns the builder must produce
    pub spec: TableSpec,
    /// Single or composite primary key
    pub primary_key: Vec<String>,
    /// Tables or views that must exist before the builder runs
    pub references: Vec<String>,
    /// Append incrementally or replace on every run
    pub write_mode: WriteMode,
}

impl StagingTableDefinition {
    /// Build a definition, checking that the primary key is declared
    pub fn new(
        spec: TableSpec,
        primary_key: Vec<String>,
        references: Vec<String>,
        write_mode: WriteMode,
    ) -> Result<Self> {
        if primary_key.is_empty() {
            return Err(EtlError::InvalidDefinition(format!(
                "staging table '{}' has an empty primary key",
                spec.name()
            )));
        }
        if let Some(column) = primary_key.iter().find(|k| !spec.has_column(k)) {
            return Err(EtlError::InvalidDefinition(format!(
                "primary key column '{column}' of '{}' is not in its columnspec",
                spec.name()
            )));
        }
        if references.iter().any(|r| r == spec.name()) {
            return Err(EtlError::InvalidDefinition(format!(
                "staging table '{}' references itself",
                spec.name()
            )));
        }
        Ok(Self {
            spec,
            primary_key,
            references,
            write_mode,
        })
    }

    /// Table name
    #[must_use]
    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// `CREATE TABLE` statement including the primary key
    #[must_use]
    pub fn create_table_sql(&self) -> String {
        self.spec.create_table_sql(&self.primary_key)
    }

    /// Parse the staging JSON document, keeping declaration order
    pub fn list_from_json(json: &str) -> Result<Vec<Self>> {
        let entries: Entries<StagingEntry> = serde_json::from_str(json)?;
        entries
            .0
            .into_iter()
            .map(|(table, entry)| {
                let spec = TableSpec::new(table, entry.columnspec.0)?;
                Self::new(
                    spec,
                    entry.primary_key.into_vec(),
                    entry.references.unwrap_or_default(),
                    entry.write_mode,
                )
            })
            .collect()
    }
}

const RAW_ORIGIN: &str = "raw tables";
const STATIC_ORIGIN: &str = "static tables";
const STAGING_ORIGIN: &str = "staging tables";

/// Every declared table, grouped by category
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    raw: TableSpecSet,
    static_tables: TableSpecSet,
    staging: Vec<StagingTableDefinition>,
}

impl SchemaRegistry {
    /// Load the three schema files named in the configuration
    pub fn load(config: &SchemaConfig) -> Result<Self> {
        let raw = read_schema_file(Path::new(&config.raw_tables))?;
        let static_tables = read_schema_file(Path::new(&config.static_tables))?;
        let staging = read_schema_file(Path::new(&config.staging_tables))?;
        let registry = Self::from_json(&raw, &static_tables, &staging)?;
        info!(
            raw = registry.raw.len(),
            static_tables = registry.static_tables.len(),
            staging = registry.staging.len(),
            "Loaded table specifications"
        );
        Ok(registry)
    }

    /// Build a registry from the three JSON documents
    pub fn from_json(raw: &str, static_tables: &str, staging: &str) -> Result<Self> {
        let raw = TableSpecSet::from_json(raw, RAW_ORIGIN)?;
        let static_tables = TableSpecSet::from_json(static_tables, STATIC_ORIGIN)?;
        let staging = StagingTableDefinition::list_from_json(staging)?;
        Self::new(raw, static_tables, staging)
    }

    /// Assemble a registry, rejecting names declared more than once
    pub fn new(
        raw: TableSpecSet,
        static_tables: TableSpecSet,
        staging: Vec<StagingTableDefinition>,
    ) -> Result<Self> {
        let mut origins: HashMap<String, &'static str> = HashMap::new();
        let named = raw
            .names()
            .into_iter()
            .map(|n| (n, RAW_ORIGIN))
            .chain(static_tables.names().into_iter().map(|n| (n, STATIC_ORIGIN)))
            .chain(staging.iter().map(|d| (d.name(), STAGING_ORIGIN)));
        for (name, origin) in named {
            // SQLite table names are case-insensitive
            if let Some(first) = origins.insert(name.to_ascii_lowercase(), origin) {
                return Err(EtlError::DuplicateDefinition {
                    name: name.to_string(),
                    first: first.to_string(),
                    second: origin.to_string(),
                });
            }
        }

        Ok(Self {
            raw,
            static_tables,
            staging,
        })
    }

    /// Raw table specs
    #[must_use]
    pub fn raw(&self) -> &TableSpecSet {
        &self.raw
    }

    /// Static table specs
    #[must_use]
    pub fn static_tables(&self) -> &TableSpecSet {
        &self.static_tables
    }

    /// Staging definitions in declaration order
    #[must_use]
    pub fn staging(&self) -> &[StagingTableDefinition] {
        &self.staging
    }

    /// Strict check of a freshly mirrored working copy against the raw specs
    pub fn validate_mirror(&self, conn: &Connection) -> Result<()> {
        validate(conn, &self.raw, "working copy")
    }

    /// Check the analytical target.
    ///
    /// Raw and static tables must be present. Staging tables may be absent
    /// because they have not been built yet. Any undeclared table is an error.
    pub fn validate_target(&self, conn: &Connection) -> Result<()> {
        let optional: HashSet<&str> = self.staging.iter().map(StagingTableDefinition::name).collect();
        let specs = self
            .raw
            .iter()
            .chain(self.static_tables.iter())
            .chain(self.staging.iter().map(|d| &d.spec));
        let discrepancies = collect_discrepancies(conn, specs, &optional)?;
        into_result(discrepancies, "target database")
    }
}

fn read_schema_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        EtlError::InvalidDefinition(format!("cannot read schema file {}: {e}", path.display()))
    })
}

/// Validate a live database against a spec set, two-way on tables and columns.
///
/// Every discrepancy is reported, not just the first.
pub fn validate(conn: &Connection, specs: &TableSpecSet, scope: &str) -> Result<()> {
    let discrepancies = collect_discrepancies(conn, specs.iter(), &HashSet::new())?;
    into_result(discrepancies, scope)
}

fn into_result(mut discrepancies: Vec<Discrepancy>, scope: &str) -> Result<()> {
    if discrepancies.is_empty() {
        debug!(scope, "Schema validated");
        return Ok(());
    }
    discrepancies.sort();
    Err(SchemaMismatch {
        scope: scope.to_string(),
        discrepancies,
    }
    .into())
}

fn collect_discrepancies<'a>(
    conn: &Connection,
    specs: impl IntoIterator<Item = &'a TableSpec>,
    optional: &HashSet<&str>,
) -> Result<Vec<Discrepancy>> {
    let live: HashSet<String> = list_tables(conn)?.into_iter().collect();
    let mut declared = HashSet::new();
    let mut discrepancies = Vec::new();

    for spec in specs {
        declared.insert(spec.name().to_string());
        if !live.contains(spec.name()) {
            if !optional.contains(spec.name()) {
                discrepancies.push(Discrepancy::MissingTable(spec.name().to_string()));
            }
            continue;
        }
        discrepancies.extend(column_discrepancies(conn, spec)?);
    }

    let mut undeclared: Vec<&String> = live.iter().filter(|t| !declared.contains(*t)).collect();
    undeclared.sort();
    discrepancies.extend(
        undeclared
            .into_iter()
            .map(|t| Discrepancy::UndeclaredTable(t.clone())),
    );

    Ok(discrepancies)
}

fn column_discrepancies(conn: &Connection, spec: &TableSpec) -> Result<Vec<Discrepancy>> {
    let live = table_columns(conn, spec.name())?;
    let live_types: HashMap<&str, &str> =
        live.iter().map(|(n, t)| (n.as_str(), t.as_str())).collect();
    let mut discrepancies = Vec::new();

    for column in spec.columns() {
        match live_types.get(column.name.as_str()) {
            None => discrepancies.push(Discrepancy::MissingColumn {
                table: spec.name().to_string(),
                column: column.name.clone(),
            }),
            Some(live_type) if !live_type.eq_ignore_ascii_case(&column.declared_type) => {
                warn!(
                    table = spec.name(),
                    column = column.name.as_str(),
                    declared = column.declared_type.as_str(),
                    live = *live_type,
                    "Declared column type differs from live type"
                );
            },
            Some(_) => {},
        }
    }

    for (name, _) in &live {
        if !spec.has_column(name) {
            discrepancies.push(Discrepancy::UndeclaredColumn {
                table: spec.name().to_string(),
                column: name.clone(),
            });
        }
    }

    Ok(discrepancies)
}

/// Render the tables of a live database in the raw-table JSON format.
///
/// Column order follows the live table; useful to bootstrap a raw schema file
/// for a new source database version.
pub fn describe_database(conn: &Connection) -> Result<String> {
    let mut tables = Vec::new();
    for table in list_tables(conn)? {
        let columns = table_columns(conn, &table)?
            .into_iter()
            .map(|(name, declared)| {
                Ok(format!(
                    "    {}: {}",
                    serde_json::to_string(&name)?,
                    serde_json::to_string(&declared)?
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        tables.push(format!(
            "  {}: {{\n{}\n  }}",
            serde_json::to_string(&table)?,
            columns.join(",\n")
        ));
    }
    Ok(format!("{{\n{}\n}}\n", tables.join(",\n")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_keep_order_and_duplicates() {
        let entries: Entries<String> =
            serde_json::from_str(r#"{"b": "1", "a": "2", "b": "3"}"#).expect("valid json");
        let keys: Vec<&str> = entries.0.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "b"]);
    }

    #[test]
    fn test_duplicate_table_in_one_file() {
        let err = TableSpecSet::from_json(
            r#"{"message": {"ROWID": "INTEGER"}, "message": {"text": "TEXT"}}"#,
            RAW_ORIGIN,
        )
        .expect_err("duplicate must fail");
        assert!(matches!(err, EtlError::DuplicateDefinition { ref name, .. } if name == "message"));
    }

    #[test]
    fn test_primary_key_forms() {
        let defs = StagingTableDefinition::list_from_json(
            r#"{
                "a": {"columnspec": {"id": "INTEGER"}, "primary_key": "id", "references": null},
                "b": {"columnspec": {"id": "INTEGER", "idx": "INTEGER"},
                      "primary_key": ["id", "idx"], "references": ["a"], "write_mode": "replace"}
            }"#,
        )
        .expect("valid staging json");
        assert_eq!(defs[0].primary_key, vec!["id"]);
        assert!(defs[0].references.is_empty());
        assert_eq!(defs[1].primary_key, vec!["id", "idx"]);
        assert_eq!(defs[1].write_mode, WriteMode::Replace);
    }

    #[test]
    fn test_primary_key_must_be_declared() {
        let err = StagingTableDefinition::list_from_json(
            r#"{"a": {"columnspec": {"id": "INTEGER"}, "primary_key": "missing"}}"#,
        )
        .expect_err("undeclared key must fail");
        assert!(matches!(err, EtlError::InvalidDefinition(_)));
    }

    #[test]
    fn test_create_table_sql() {
        let spec = TableSpec::new("t", [("a", "INTEGER"), ("b", "TEXT")]).expect("valid spec");
        assert_eq!(
            spec.create_table_sql(&["a".to_string()]),
            r#"CREATE TABLE IF NOT EXISTS "t" ("a" INTEGER, "b" TEXT, PRIMARY KEY ("a"))"#
        );
    }

    #[test]
    fn test_describe_database_round_trips() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE message (ROWID INTEGER PRIMARY KEY, text TEXT, date INTEGER);
             CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT);",
        )?;
        let json = describe_database(&conn)?;
        let specs = TableSpecSet::from_json(&json, RAW_ORIGIN)?;
        assert_eq!(specs.names(), vec!["handle", "message"]);
        assert_eq!(
            specs.get("message").map(TableSpec::column_names),
            Some(vec!["ROWID", "text", "date"])
        );
        validate(&conn, &specs, "round trip")
    }
}
