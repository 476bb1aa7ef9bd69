//! Integration tests for static reference tables

use std::fs;

use rusqlite::Connection;
use tempfile::tempdir;
use txt_history_etl::error::EtlError;
use txt_history_etl::registry::TableSpecSet;
use txt_history_etl::StaticTableLoader;

fn contact_specs() -> TableSpecSet {
    TableSpecSet::from_json(
        r#"{"contact": {"contact_name": "TEXT", "chat_identifier": "TEXT"}}"#,
        "static tables",
    )
    .expect("Failed to parse static specs")
}

#[test]
fn test_loads_rows_and_maps_empty_fields_to_null() {
    let dir = tempdir().expect("Failed to create temp dir");
    fs::write(
        dir.path().join("contact.csv"),
        "chat_identifier, contact_name\n+15550001,Sam\nfriend@example.com,\n",
    )
    .expect("Failed to write csv");

    let mut conn = Connection::open_in_memory().expect("Failed to open database");
    let loaded = StaticTableLoader::new(dir.path(), b',')
        .load_all(&mut conn, &contact_specs())
        .expect("Failed to load static tables");
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].rows, 2);

    let name: String = conn
        .query_row(
            "SELECT contact_name FROM contact WHERE chat_identifier = '+15550001'",
            [],
            |r| r.get(0),
        )
        .expect("Failed to read contact");
    assert_eq!(name, "Sam");
    let nulls: i64 = conn
        .query_row("SELECT COUNT(*) FROM contact WHERE contact_name IS NULL", [], |r| r.get(0))
        .expect("Failed to count nulls");
    assert_eq!(nulls, 1);
}

#[test]
fn test_reload_replaces_previous_contents() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("contact.csv");
    let loader = StaticTableLoader::new(dir.path(), b',');
    let mut conn = Connection::open_in_memory().expect("Failed to open database");

    fs::write(&path, "contact_name,chat_identifier\nA,1\nB,2\nC,3\n").expect("Failed to write csv");
    loader.load_all(&mut conn, &contact_specs()).expect("First load failed");
    fs::write(&path, "contact_name,chat_identifier\nD,4\n").expect("Failed to write csv");
    loader.load_all(&mut conn, &contact_specs()).expect("Second load failed");

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM contact", [], |r| r.get(0))
        .expect("Failed to count");
    assert_eq!(count, 1);
}

#[test]
fn test_header_mismatch_in_either_direction_fails() {
    let dir = tempdir().expect("Failed to create temp dir");
    let loader = StaticTableLoader::new(dir.path(), b',');
    let mut conn = Connection::open_in_memory().expect("Failed to open database");

    for header in [
        "contact_name\n",
        "contact_name,chat_identifier,nickname\n",
        "contact_name,contact_name,chat_identifier\n",
    ] {
        fs::write(dir.path().join("contact.csv"), header).expect("Failed to write csv");
        let result = loader.load_all(&mut conn, &contact_specs());
        assert!(
            matches!(result, Err(EtlError::StaticData { ref table, .. }) if table == "contact"),
            "header {header:?} must be rejected"
        );
    }
}

#[test]
fn test_missing_file_fails() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut conn = Connection::open_in_memory().expect("Failed to open database");
    let err = StaticTableLoader::new(dir.path(), b',')
        .load_all(&mut conn, &contact_specs())
        .expect_err("file is missing");
    assert!(err.to_string().contains("file not found"));
}

#[test]
fn test_undeclared_file_fails_before_loading() {
    let dir = tempdir().expect("Failed to create temp dir");
    fs::write(dir.path().join("contact.csv"), "contact_name,chat_identifier\nA,1\n")
        .expect("Failed to write csv");
    fs::write(dir.path().join("nicknames.csv"), "name\nx\n").expect("Failed to write csv");

    let mut conn = Connection::open_in_memory().expect("Failed to open database");
    let err = StaticTableLoader::new(dir.path(), b',')
        .load_all(&mut conn, &contact_specs())
        .expect_err("orphan file");
    assert!(matches!(err, EtlError::StaticData { ref table, .. } if table == "nicknames"));

    let tables: i64 = conn
        .query_row("SELECT COUNT(*) FROM sqlite_master WHERE name = 'contact'", [], |r| r.get(0))
        .expect("Failed to query schema");
    assert_eq!(tables, 0);
}

#[test]
fn test_tab_delimited_files() {
    let dir = tempdir().expect("Failed to create temp dir");
    fs::write(
        dir.path().join("contact.csv"),
        "contact_name\tchat_identifier\nSam, Jr.\t+15550001\n",
    )
    .expect("Failed to write csv");

    let mut conn = Connection::open_in_memory().expect("Failed to open database");
    StaticTableLoader::new(dir.path(), b'\t')
        .load_all(&mut conn, &contact_specs())
        .expect("Failed to load");
    let name: String = conn
        .query_row("SELECT contact_name FROM contact", [], |r| r.get(0))
        .expect("Failed to read contact");
    assert_eq!(name, "Sam, Jr.");
}

#[test]
fn test_only_lowercase_csv_extension_is_a_data_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    fs::write(dir.path().join("contact.csv"), "contact_name,chat_identifier\nSam,1\n")
        .expect("Failed to write csv");
    // Not a data file, so it is neither loaded nor reported as undeclared
    fs::write(dir.path().join("nicknames.CSV"), "nickname\nsammy\n").expect("Failed to write csv");

    let mut conn = Connection::open_in_memory().expect("Failed to open database");
    let loaded = StaticTableLoader::new(dir.path(), b',')
        .load_all(&mut conn, &contact_specs())
        .expect("Failed to load static tables");
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].rows, 1);
}
