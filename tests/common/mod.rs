//! Shared fixtures: a small message database shaped like the declared raw tables

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use txt_history_etl::config::AppConfig;

/// Creation SQL for every table in `config/schema/raw_tables.json`
pub const SOURCE_SCHEMA: &str = "
    CREATE TABLE message (
        ROWID INTEGER PRIMARY KEY, guid TEXT UNIQUE NOT NULL, text TEXT, handle_id INTEGER DEFAULT 0,
        service TEXT, date INTEGER, date_read INTEGER, date_delivered INTEGER,
        is_from_me INTEGER DEFAULT 0, is_read INTEGER DEFAULT 0, cache_has_attachments INTEGER DEFAULT 0,
        associated_message_guid TEXT, associated_message_type INTEGER DEFAULT 0,
        thread_originator_guid TEXT
    );
    CREATE TABLE handle (
        ROWID INTEGER PRIMARY KEY, id TEXT NOT NULL, country TEXT, service TEXT,
        uncanonicalized_id TEXT, person_centric_id TEXT
    );
    CREATE TABLE chat (
        ROWID INTEGER PRIMARY KEY, guid TEXT, style INTEGER, chat_identifier TEXT,
        service_name TEXT, display_name TEXT
    );
    CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER, message_date INTEGER);
    CREATE TABLE chat_handle_join (chat_id INTEGER, handle_id INTEGER);
    CREATE TABLE attachment (
        ROWID INTEGER PRIMARY KEY, guid TEXT, filename TEXT, mime_type TEXT,
        transfer_name TEXT, total_bytes INTEGER
    );
    CREATE TABLE message_attachment_join (message_id INTEGER, attachment_id INTEGER);
";

/// Path to a file shipped under `config/`
pub fn config_file(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config").join(relative)
}

/// Create a source database with two handles and no messages
pub fn create_source(path: &Path) -> Connection {
    let conn = Connection::open(path).expect("Failed to create source database");
    conn.execute_batch(SOURCE_SCHEMA)
        .expect("Failed to create source schema");
    conn.execute_batch(
        "INSERT INTO handle (ROWID, id, service) VALUES (1, '+15550001', 'iMessage');
         INSERT INTO handle (ROWID, id, service) VALUES (2, 'friend@example.com', 'iMessage');",
    )
    .expect("Failed to insert handles");
    conn
}

/// Insert one message; `date` is seconds since 2001-01-01
pub fn insert_message(conn: &Connection, id: i64, text: Option<&str>, handle_id: i64, from_me: bool) {
    conn.execute(
        "INSERT INTO message (ROWID, guid, text, handle_id, service, date, is_from_me) \
         VALUES (?1, ?2, ?3, ?4, 'iMessage', ?5, ?6)",
        params![
            id,
            format!("guid-{id}"),
            text,
            handle_id,
            600_000_000 + id * 60,
            i64::from(from_me)
        ],
    )
    .expect("Failed to insert message");
}

/// Configuration pointing every path into `dir`, using the shipped schema files
pub fn test_config(dir: &Path) -> AppConfig {
    let static_dir = dir.join("static");
    fs::create_dir_all(&static_dir).expect("Failed to create static directory");

    let mut config = AppConfig::default();
    config.database.source_path = path_string(&dir.join("chat.db"));
    config.database.working_path = path_string(&dir.join("chat_copy.db"));
    config.database.target_path = path_string(&dir.join("analytics.db"));
    config.schema.raw_tables = path_string(&config_file("schema/raw_tables.json"));
    config.schema.static_tables = path_string(&config_file("schema/static_tables.json"));
    config.schema.staging_tables = path_string(&config_file("schema/staging_tables.json"));
    config.static_data.directory = path_string(&static_dir);
    config
}

/// Write the contact reference file
pub fn write_contacts(config: &AppConfig, rows: &[(&str, &str)]) {
    let mut body = String::from("contact_name,chat_identifier\n");
    for (name, identifier) in rows {
        body.push_str(&format!("{name},{identifier}\n"));
    }
    fs::write(Path::new(&config.static_data.directory).join("contact.csv"), body)
        .expect("Failed to write contact.csv");
}

pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Single integer from a query
pub fn query_i64(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0))
        .expect("Failed to run query")
}
