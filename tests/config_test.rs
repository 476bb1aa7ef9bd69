//! Integration tests for config.rs

use std::fs;

use tempfile::tempdir;
use txt_history_etl::config::{AppConfig, ExecutionOrder};

#[test]
fn test_default_database_paths() {
    let config = AppConfig::default();

    assert_eq!(config.database.working_path, "data/chat_copy.db");
    assert_eq!(config.database.target_path, "data/analytics.db");
    assert_eq!(config.database.max_connections, 4);
    assert_eq!(config.busy_timeout().as_secs(), 30);
}

#[test]
fn test_default_schema_locations() {
    let config = AppConfig::default();

    assert_eq!(config.schema.raw_tables, "config/schema/raw_tables.json");
    assert_eq!(config.schema.static_tables, "config/schema/static_tables.json");
    assert_eq!(config.schema.staging_tables, "config/schema/staging_tables.json");
    assert_eq!(config.static_data.directory, "config/static");
    assert_eq!(config.delimiter(), b',');
}

#[test]
fn test_default_staging_and_nlp() {
    let config = AppConfig::default();

    assert_eq!(config.execution_order().expect("valid order"), ExecutionOrder::Dependency);
    assert_eq!(config.staging.batch_size, 5000);
    assert_eq!(config.nlp.max_text_length, 10000);
    assert!(config.nlp.abbreviations.is_empty());
}

#[test]
fn test_default_logging_config() {
    let config = AppConfig::default();

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.file_path, None);
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_default_config_is_valid() {
    assert!(AppConfig::default().validate().is_ok());
}

#[test]
fn test_working_and_target_must_differ() {
    let mut config = AppConfig::default();
    config.database.working_path = config.database.target_path.clone();
    assert!(config.validate().is_err());
}

#[test]
fn test_source_must_differ_from_working_and_target() {
    let mut config = AppConfig::default();
    config.database.target_path = config.database.source_path.clone();
    let err = config.validate().expect_err("target equals source");
    assert!(err.to_string().contains("database.target_path"));

    let mut config = AppConfig::default();
    config.database.working_path = config.database.source_path.clone();
    let err = config.validate().expect_err("working copy equals source");
    assert!(err.to_string().contains("database.working_path"));
}

#[test]
fn test_invalid_values_are_rejected() {
    let cases: Vec<Box<dyn Fn(&mut AppConfig)>> = vec![
        Box::new(|c| c.database.max_connections = 0),
        Box::new(|c| c.database.target_path = String::new()),
        Box::new(|c| c.schema.staging_tables = "   ".to_string()),
        Box::new(|c| c.staging.batch_size = 0),
        Box::new(|c| c.staging.order = "alphabetical".to_string()),
        Box::new(|c| c.static_data.delimiter = ";;".to_string()),
        Box::new(|c| c.nlp.max_text_length = 0),
        Box::new(|c| c.logging.level = "verbose".to_string()),
        Box::new(|c| c.logging.format = "xml".to_string()),
        Box::new(|c| {
            c.nlp
                .abbreviations
                .insert("idk".to_string(), "i do not know".to_string());
        }),
    ];

    for (i, mutate) in cases.iter().enumerate() {
        let mut config = AppConfig::default();
        mutate(&mut config);
        assert!(config.validate().is_err(), "case {i} should be invalid");
    }
}

#[test]
fn test_declared_order_parses() {
    let mut config = AppConfig::default();
    config.staging.order = "declared".to_string();
    assert_eq!(config.execution_order().expect("valid order"), ExecutionOrder::Declared);
}

#[test]
fn test_load_applies_explicit_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("override.toml");
    fs::write(
        &path,
        "[staging]\norder = \"declared\"\nbatch_size = 250\n\n[nlp.abbreviations]\ntmrw = \"tomorrow\"\n",
    )
    .expect("Failed to write config");

    let config = AppConfig::load(Some(&path)).expect("Failed to load config");
    assert_eq!(config.staging.order, "declared");
    assert_eq!(config.staging.batch_size, 250);
    assert_eq!(
        config.nlp.abbreviations.get("tmrw").map(String::as_str),
        Some("tomorrow")
    );
    // untouched sections keep their defaults
    assert_eq!(config.database.target_path, "data/analytics.db");
}

#[test]
fn test_load_rejects_invalid_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[staging]\nbatch_size = 0\n").expect("Failed to write config");
    assert!(AppConfig::load(Some(&path)).is_err());
}

#[test]
fn test_load_requires_explicit_file_to_exist() {
    let dir = tempdir().expect("Failed to create temp dir");
    assert!(AppConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
}

#[test]
fn test_environment_overrides_files() {
    std::env::set_var("TXT_HISTORY__STATIC_DATA__DIRECTORY", "/srv/reference");
    let config = AppConfig::load(None);
    std::env::remove_var("TXT_HISTORY__STATIC_DATA__DIRECTORY");

    let config = config.expect("Failed to load config");
    assert_eq!(config.static_data.directory, "/srv/reference");
}

#[test]
fn test_rust_log_wins_over_configured_level() {
    let config = AppConfig::default();
    std::env::set_var("RUST_LOG", "debug");
    let level = config.get_log_level();
    std::env::remove_var("RUST_LOG");
    assert_eq!(level, "debug");
}
