use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::validation::InputValidator;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub schema: SchemaConfig,
    pub static_data: StaticDataConfig,
    pub staging: StagingConfig,
    pub nlp: NlpConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Source message database, opened read-only
    pub source_path: String,
    /// Working copy recreated from the source on every run
    pub working_path: String,
    /// Persistent analytical database
    pub target_path: String,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

/// Locations of the declarative schema files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub raw_tables: String,
    pub static_tables: String,
    pub staging_tables: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticDataConfig {
    /// Directory holding one `<table>.csv` per static table
    pub directory: String,
    pub delimiter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// "dependency" (derive order from references) or "declared"
    pub order: String,
    /// Maximum number of upstream keys processed per batch
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlpConfig {
    pub max_text_length: usize,
    /// Extra one-word abbreviation expansions, merged over the built-in table
    #[serde(default)]
    pub abbreviations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

/// How staging builders are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOrder {
    /// Topological order derived from each table's references
    Dependency,
    /// Configuration order, checked against the references
    Declared,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                source_path: default_source_path(),
                working_path: "data/chat_copy.db".to_string(),
                target_path: "data/analytics.db".to_string(),
                max_connections: 4,
                busy_timeout_secs: 30,
            },
            schema: SchemaConfig {
                raw_tables: "config/schema/raw_tables.json".to_string(),
                static_tables: "config/schema/static_tables.json".to_string(),
                staging_tables: "config/schema/staging_tables.json".to_string(),
            },
            static_data: StaticDataConfig {
                directory: "config/static".to_string(),
                delimiter: ",".to_string(),
            },
            staging: StagingConfig {
                order: "dependency".to_string(),
                batch_size: 5000,
            },
            nlp: NlpConfig {
                max_text_length: 10000,
                abbreviations: BTreeMap::new(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
        }
    }
}

fn default_source_path() -> String {
    std::env::var("HOME")
        .map(|home| format!("{home}/Library/Messages/chat.db"))
        .unwrap_or_default()
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&Self::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = Config::builder()
            // Start with default values
            .add_source(defaults)
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // Add environment variables with prefix, e.g. TXT_HISTORY__STAGING__BATCH_SIZE
            .add_source(Environment::with_prefix("TXT_HISTORY").prefix_separator("__").separator("__"))
            .build()
            .context("Failed to load configuration")?;

        let app_config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        for (label, path) in [
            ("database.working_path", &self.database.working_path),
            ("database.target_path", &self.database.target_path),
            ("schema.raw_tables", &self.schema.raw_tables),
            ("schema.static_tables", &self.schema.static_tables),
            ("schema.staging_tables", &self.schema.staging_tables),
            ("static_data.directory", &self.static_data.directory),
        ] {
            InputValidator::validate_file_path(Path::new(path))
                .with_context(|| format!("Invalid {label}"))?;
        }
        for (label, path) in [
            ("database.working_path", &self.database.working_path),
            ("database.target_path", &self.database.target_path),
        ] {
            if *path == self.database.source_path {
                return Err(anyhow::anyhow!("{label} must differ from database.source_path"));
            }
        }
        if self.database.working_path == self.database.target_path {
            return Err(anyhow::anyhow!(
                "database.working_path and database.target_path must differ"
            ));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }

        InputValidator::validate_delimiter(&self.static_data.delimiter)?;

        // Validate staging config
        self.execution_order()?;
        if self.staging.batch_size == 0 {
            return Err(anyhow::anyhow!("batch_size must be greater than 0"));
        }

        // Validate NLP config
        if self.nlp.max_text_length == 0 {
            return Err(anyhow::anyhow!("max_text_length must be greater than 0"));
        }
        for (abbreviation, expansion) in &self.nlp.abbreviations {
            InputValidator::validate_abbreviation(abbreviation, expansion)?;
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        Ok(())
    }

    /// Parsed staging execution order
    pub fn execution_order(&self) -> Result<ExecutionOrder> {
        match self.staging.order.as_str() {
            "dependency" => Ok(ExecutionOrder::Dependency),
            "declared" => Ok(ExecutionOrder::Declared),
            other => Err(anyhow::anyhow!(
                "Invalid staging order: {other}. Must be one of: [\"dependency\", \"declared\"]"
            )),
        }
    }

    /// Source database path
    #[must_use]
    pub fn source_path(&self) -> PathBuf {
        PathBuf::from(&self.database.source_path)
    }

    /// Working copy path
    #[must_use]
    pub fn working_path(&self) -> PathBuf {
        PathBuf::from(&self.database.working_path)
    }

    /// Analytical target path
    #[must_use]
    pub fn target_path(&self) -> PathBuf {
        PathBuf::from(&self.database.target_path)
    }

    /// SQLite busy timeout
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.database.busy_timeout_secs)
    }

    /// Static-file delimiter byte; call after [`AppConfig::validate`]
    #[must_use]
    pub fn delimiter(&self) -> u8 {
        self.static_data.delimiter.as_bytes().first().copied().unwrap_or(b',')
    }

    /// Get log level from environment or config
    #[must_use]
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database.target_path, "data/analytics.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.staging.batch_size, 5000);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
