use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use txt_history_etl::config::AppConfig;
use txt_history_etl::logging::{init_logging, level_for_verbosity};
use txt_history_etl::mirror::open_read_only;
use txt_history_etl::models::{MessageText, OutputFormat, RunSummary};
use txt_history_etl::registry::describe_database;
use txt_history_etl::{Pipeline, TokenPipeline};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file, applied over config/default and config/local
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror the source, load static tables and build every staging table
    Run {
        #[command(flatten)]
        paths: PathArgs,

        /// Summary format (text or json)
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
    /// Mirror the source and validate schemas without building staging tables
    Validate {
        #[command(flatten)]
        paths: PathArgs,
    },
    /// Print the token stream for a piece of text
    Tokenize {
        /// Text to tokenize
        #[arg(short, long)]
        text: String,
    },
    /// Print the tables of a database in the raw-table schema format
    Schema {
        /// Database to describe (defaults to the source database)
        #[arg(short, long)]
        database: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct PathArgs {
    /// Source message database (opened read-only)
    #[arg(long)]
    source: Option<PathBuf>,

    /// Analytical target database
    #[arg(long)]
    target: Option<PathBuf>,

    /// Working copy of the source
    #[arg(long)]
    working: Option<PathBuf>,
}

impl PathArgs {
    fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(source) = &self.source {
            config.database.source_path = source.to_string_lossy().into_owned();
        }
        if let Some(target) = &self.target {
            config.database.target_path = target.to_string_lossy().into_owned();
        }
        if let Some(working) = &self.working {
            config.database.working_path = working.to_string_lossy().into_owned();
        }
        config.validate().context("Invalid path override")
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load(cli.config.as_deref())?;

    // Initialize logging; the guard flushes the log file when dropped
    let level = level_for_verbosity(&config.get_log_level(), cli.verbose);
    let log_file = config.logging.file_path.as_deref().map(Path::new);
    let _guard = init_logging(Some(&level), log_file, config.logging.format == "json")?;

    info!("Starting txt-history-etl");

    match cli.command {
        Commands::Run { paths, format } => {
            paths.apply(&mut config)?;
            let pipeline = Pipeline::new(config).context("Failed to build pipeline")?;
            let summary = pipeline.run().context("Pipeline run failed")?;
            print_summary(&summary, format)?;
        },
        Commands::Validate { paths } => {
            paths.apply(&mut config)?;
            let pipeline = Pipeline::new(config).context("Failed to build pipeline")?;
            let report = pipeline.validate_only().context("Validation failed")?;
            info!(
                tables = report.tables.len(),
                rows = report.total_rows(),
                "Schemas are valid"
            );
        },
        Commands::Tokenize { text } => {
            let tokens = TokenPipeline::new(&config.nlp)?;
            let records = tokens.tokenize(&MessageText { id: 0, text: &text })?;
            print_json(&records)?;
        },
        Commands::Schema { database } => {
            let path = database.unwrap_or_else(|| config.source_path());
            let conn = open_read_only(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let json = describe_database(&conn)?;
            #[allow(clippy::print_stdout)]
            {
                print!("{json}");
            }
        },
    }

    Ok(())
}

fn print_summary(summary: &RunSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Text => {
            #[allow(clippy::print_stdout)]
            {
                print!("{summary}");
            }
            Ok(())
        },
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    #[allow(clippy::print_stdout)]
    {
        println!("{json}");
    }
    Ok(())
}
