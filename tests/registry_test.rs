//! Integration tests for declarative table specs and schema validation

mod common;

use proptest::prelude::*;
use rusqlite::Connection;
use txt_history_etl::config::SchemaConfig;
use txt_history_etl::error::{Discrepancy, EtlError};
use txt_history_etl::models::WriteMode;
use txt_history_etl::registry::{validate, SchemaRegistry, StagingTableDefinition, TableSpecSet};

use common::{config_file, path_string};

const COLUMNS: [&str; 5] = ["alpha", "beta", "gamma", "delta", "epsilon"];

fn pick(mask: u8) -> Vec<&'static str> {
    COLUMNS
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, c)| *c)
        .collect()
}

fn shipped_schema() -> SchemaConfig {
    SchemaConfig {
        raw_tables: path_string(&config_file("schema/raw_tables.json")),
        static_tables: path_string(&config_file("schema/static_tables.json")),
        staging_tables: path_string(&config_file("schema/staging_tables.json")),
    }
}

#[test]
fn test_shipped_schema_files_load() {
    let registry = SchemaRegistry::load(&shipped_schema()).expect("Failed to load shipped schema");

    assert!(registry.raw().get("message").is_some());
    assert!(registry.raw().get("handle").is_some());
    assert_eq!(registry.static_tables().names(), vec!["contact"]);

    let staging: Vec<&str> = registry.staging().iter().map(StagingTableDefinition::name).collect();
    assert_eq!(
        staging,
        vec![
            "emoji_text_map",
            "message_user",
            "message_tokens",
            "message_emoji",
            "token_descriptors",
            "contact_stats"
        ]
    );

    let tokens = &registry.staging()[2];
    assert_eq!(tokens.primary_key, vec!["message_id", "token_idx"]);
    assert_eq!(tokens.write_mode, WriteMode::Append);
    assert_eq!(registry.staging()[0].write_mode, WriteMode::Replace);
    assert!(registry.staging()[0].references.is_empty());
}

#[test]
fn test_name_shared_across_categories_is_rejected() {
    let raw = r#"{"contact": {"id": "INTEGER"}}"#;
    let static_tables = r#"{"contact": {"contact_name": "TEXT"}}"#;
    let err = SchemaRegistry::from_json(raw, static_tables, "{}").expect_err("duplicate name");
    match err {
        EtlError::DuplicateDefinition { name, first, second } => {
            assert_eq!(name, "contact");
            assert_eq!(first, "raw tables");
            assert_eq!(second, "static tables");
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_staging_name_clashing_with_raw_table_is_rejected() {
    let raw = r#"{"message": {"ROWID": "INTEGER"}}"#;
    let staging = r#"{"message": {"columnspec": {"id": "INTEGER"}, "primary_key": "id"}}"#;
    let result = SchemaRegistry::from_json(raw, "{}", staging);
    assert!(matches!(result, Err(EtlError::DuplicateDefinition { .. })));
}

#[test]
fn test_unknown_staging_field_is_rejected() {
    let staging = r#"{"t": {"columnspec": {"id": "INTEGER"}, "primary_key": "id", "refs": []}}"#;
    assert!(SchemaRegistry::from_json("{}", "{}", staging).is_err());
}

#[test]
fn test_invalid_identifiers_are_rejected() {
    let result = TableSpecSet::from_json(r#"{"bad name": {"id": "INTEGER"}}"#, "raw tables");
    assert!(matches!(result, Err(EtlError::InvalidDefinition(_))));

    let result = TableSpecSet::from_json(r#"{"t": {"id; DROP": "INTEGER"}}"#, "raw tables");
    assert!(matches!(result, Err(EtlError::InvalidDefinition(_))));

    let result = TableSpecSet::from_json(r#"{"t": {}}"#, "raw tables");
    assert!(matches!(result, Err(EtlError::InvalidDefinition(_))));
}

#[test]
fn test_validate_reports_every_discrepancy() {
    let conn = Connection::open_in_memory().expect("Failed to open database");
    conn.execute_batch(
        "CREATE TABLE message (ROWID INTEGER PRIMARY KEY, text TEXT, extra TEXT);
         CREATE TABLE attachment (ROWID INTEGER PRIMARY KEY);",
    )
    .expect("Failed to create tables");

    let specs = TableSpecSet::from_json(
        r#"{"message": {"ROWID": "INTEGER", "text": "TEXT", "date": "INTEGER"},
            "handle": {"ROWID": "INTEGER", "id": "TEXT"}}"#,
        "raw tables",
    )
    .expect("Failed to parse specs");

    let err = validate(&conn, &specs, "working copy").expect_err("schemas differ");
    let EtlError::SchemaMismatch(mismatch) = err else {
        panic!("expected a schema mismatch");
    };
    assert_eq!(mismatch.scope, "working copy");
    assert_eq!(mismatch.missing_tables(), vec!["handle"]);
    assert_eq!(mismatch.undeclared_tables(), vec!["attachment"]);
    assert!(mismatch.discrepancies.contains(&Discrepancy::MissingColumn {
        table: "message".to_string(),
        column: "date".to_string(),
    }));
    assert!(mismatch.discrepancies.contains(&Discrepancy::UndeclaredColumn {
        table: "message".to_string(),
        column: "extra".to_string(),
    }));
    assert_eq!(mismatch.discrepancies.len(), 4);
}

#[test]
fn test_type_difference_is_not_a_mismatch() {
    let conn = Connection::open_in_memory().expect("Failed to open database");
    conn.execute_batch("CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id VARCHAR(64))")
        .expect("Failed to create table");
    let specs = TableSpecSet::from_json(r#"{"handle": {"ROWID": "INTEGER", "id": "TEXT"}}"#, "raw tables")
        .expect("Failed to parse specs");
    assert!(validate(&conn, &specs, "working copy").is_ok());
}

#[test]
fn test_target_validation_allows_unbuilt_staging_tables() {
    let registry = SchemaRegistry::from_json(
        r#"{"message": {"ROWID": "INTEGER", "text": "TEXT"}}"#,
        r#"{"contact": {"contact_name": "TEXT", "chat_identifier": "TEXT"}}"#,
        r#"{"message_user": {"columnspec": {"message_id": "INTEGER"}, "primary_key": "message_id",
            "references": ["message", "contact"]}}"#,
    )
    .expect("Failed to build registry");

    let conn = Connection::open_in_memory().expect("Failed to open database");
    conn.execute_batch(
        "CREATE TABLE message (ROWID INTEGER PRIMARY KEY, text TEXT);
         CREATE TABLE contact (contact_name TEXT, chat_identifier TEXT);",
    )
    .expect("Failed to create tables");
    assert!(registry.validate_target(&conn).is_ok());
    // the mirror check knows nothing about static tables
    assert!(registry.validate_mirror(&conn).is_err());

    conn.execute_batch("CREATE TABLE message_user (message_id INTEGER, stray TEXT)")
        .expect("Failed to create staging table");
    assert!(registry.validate_target(&conn).is_err());

    conn.execute_batch("DROP TABLE contact").expect("Failed to drop");
    let err = registry.validate_target(&conn).expect_err("contact is required");
    assert!(err.to_string().contains("missing table 'contact'"));
}

proptest! {
    #[test]
    fn prop_validate_fails_iff_column_sets_differ(declared in 1u8..32, live in 1u8..32) {
        let conn = Connection::open_in_memory().expect("Failed to open database");
        let live_columns: Vec<String> = pick(live).iter().map(|c| format!("{c} TEXT")).collect();
        conn.execute_batch(&format!("CREATE TABLE t ({})", live_columns.join(", ")))
            .expect("Failed to create table");

        let spec_json: Vec<String> = pick(declared).iter().map(|c| format!("\"{c}\": \"TEXT\"")).collect();
        let specs = TableSpecSet::from_json(&format!("{{\"t\": {{{}}}}}", spec_json.join(", ")), "raw tables")
            .expect("Failed to parse specs");

        prop_assert_eq!(validate(&conn, &specs, "prop").is_err(), declared != live);
    }

    #[test]
    fn prop_validate_fails_iff_table_sets_differ(declared in 1u8..8, live in 1u8..8) {
        let names = ["message", "handle", "chat"];
        let conn = Connection::open_in_memory().expect("Failed to open database");
        for (i, name) in names.iter().enumerate() {
            if live & (1 << i) != 0 {
                conn.execute_batch(&format!("CREATE TABLE {name} (id INTEGER)"))
                    .expect("Failed to create table");
            }
        }
        let entries: Vec<String> = names
            .iter()
            .enumerate()
            .filter(|(i, _)| declared & (1 << i) != 0)
            .map(|(_, name)| format!("\"{name}\": {{\"id\": \"INTEGER\"}}"))
            .collect();
        let specs = TableSpecSet::from_json(&format!("{{{}}}", entries.join(", ")), "raw tables")
            .expect("Failed to parse specs");

        prop_assert_eq!(validate(&conn, &specs, "prop").is_err(), declared != live);
    }
}
