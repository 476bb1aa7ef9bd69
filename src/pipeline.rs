//! One end-to-end pipeline run.
//!
//! A [`Pipeline`] owns the validated configuration, the schema registry and
//! the ordered staging graph. Everything that can be checked without touching
//! a database is checked in [`Pipeline::new`].

use std::path::Path;

use rusqlite::Connection;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::Database;
use crate::error::{ConnectivityError, Result};
use crate::logging::OperationTimer;
use crate::mirror::{open_read_only, refresh_tables, same_file, SourceMirror};
use crate::models::{MirrorReport, RunSummary};
use crate::nlp::EnglishLexicon;
use crate::registry::SchemaRegistry;
use crate::staging::{default_builders, StagingBuilder, StagingGraph};
use crate::static_tables::StaticTableLoader;
use crate::token_pipeline::TokenPipeline;

/// Mirror, validate, load and stage
pub struct Pipeline {
    config: AppConfig,
    registry: SchemaRegistry,
    graph: StagingGraph,
    mirror: SourceMirror,
}

impl Pipeline {
    /// Build a pipeline with the default builders and language capabilities
    pub fn new(config: AppConfig) -> Result<Self> {
        let registry = SchemaRegistry::load(&config.schema)?;
        let tokens = TokenPipeline::new(&config.nlp)?;
        let builders = default_builders(tokens, Box::new(EnglishLexicon::new()))?;
        Self::with_builders(config, registry, builders)
    }

    /// Build a pipeline around an explicit registry and builder set
    pub fn with_builders(
        config: AppConfig,
        registry: SchemaRegistry,
        builders: Vec<Box<dyn StagingBuilder>>,
    ) -> Result<Self> {
        config.validate()?;
        let graph = StagingGraph::new(
            registry.staging(),
            builders,
            config.execution_order()?,
            config.staging.batch_size,
        )?;
        info!(order = ?graph.order(), "Staging order resolved");

        Ok(Self {
            config,
            registry,
            graph,
            mirror: SourceMirror::new(),
        })
    }

    /// Declared tables
    #[must_use]
    pub const fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Staging tables in execution order
    #[must_use]
    pub fn staging_order(&self) -> Vec<&str> {
        self.graph.order()
    }

    /// Run every stage; the first failure aborts the run
    pub fn run(&self) -> Result<RunSummary> {
        let timer = OperationTimer::new("pipeline");

        let mirror = self.mirror_and_validate()?;
        let working = open_read_only(&self.config.working_path())?;

        let target = self.open_target()?;
        let mut conn = target.get_connection()?;

        let raw_names = self.registry.raw().names();
        let raw_tables = refresh_tables(&working, &mut conn, &raw_names)?;

        let loader = StaticTableLoader::new(&self.config.static_data.directory, self.config.delimiter());
        let static_tables = loader.load_all(&mut conn, self.registry.static_tables())?;

        self.registry.validate_target(&conn)?;
        let builds = self.graph.run(&mut conn)?;

        let summary = RunSummary {
            mirror,
            raw_tables,
            static_tables,
            builds,
        };
        info!(
            mirrored_rows = summary.mirror.total_rows(),
            staging_tables = summary.builds.len(),
            inserted = summary.builds.iter().map(|b| b.inserted).sum::<u64>(),
            duration_ms = timer.finish(),
            "Pipeline run complete"
        );
        Ok(summary)
    }

    /// Mirror and validate without touching staging tables.
    ///
    /// The target is validated too when it already exists.
    pub fn validate_only(&self) -> Result<MirrorReport> {
        let report = self.mirror_and_validate()?;

        let target_path = self.config.target_path();
        if target_path.exists() {
            let conn = open_read_only(&target_path)?;
            self.registry.validate_target(&conn)?;
            info!(target = %target_path.display(), "Target database matches its schema");
        } else {
            warn!(target = %target_path.display(), "Target database does not exist yet");
        }
        Ok(report)
    }

    fn mirror_and_validate(&self) -> Result<MirrorReport> {
        self.check_paths()?;
        let working_path = self.config.working_path();
        let report = self.mirror.copy(&self.config.source_path(), &working_path)?;
        validate_working_copy(&self.registry, &working_path)?;
        Ok(report)
    }

    /// The source may not be reached through the working or target path
    fn check_paths(&self) -> Result<()> {
        let source = self.config.source_path();
        for path in [self.config.working_path(), self.config.target_path()] {
            if same_file(&source, &path) {
                return Err(ConnectivityError::SamePath(path).into());
            }
        }
        Ok(())
    }

    fn open_target(&self) -> Result<Database> {
        Database::open(
            &self.config.target_path(),
            self.config.database.max_connections,
            self.config.busy_timeout(),
        )
    }
}

fn validate_working_copy(registry: &SchemaRegistry, path: &Path) -> Result<()> {
    let conn: Connection = open_read_only(path)?;
    registry.validate_mirror(&conn)?;
    info!("Working copy matches the raw table specs");
    Ok(())
}
