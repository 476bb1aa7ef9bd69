//! Staging tables: definitions paired with builders, run in dependency order.
//!
//! Each staging table is declared in the staging schema file and computed by
//! exactly one [`StagingBuilder`]. Append-mode tables go through the
//! incremental anti-join in [`incremental`]; replace-mode tables are rebuilt
//! from scratch on every run.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use petgraph::{Directed, Direction, Graph};
use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::{error, info, instrument};

use crate::config::ExecutionOrder;
use crate::db::{quote_ident, relation_exists};
use crate::error::{EtlError, Result};
use crate::logging::OperationTimer;
use crate::metrics::PipelineMetrics;
use crate::models::{BuildReport, WriteMode};
use crate::nlp::Lexicon;
use crate::registry::StagingTableDefinition;
use crate::token_pipeline::TokenPipeline;

pub mod contact_stats;
pub mod emoji_text_map;
pub mod incremental;
pub mod message_emoji;
pub mod message_tokens;
pub mod message_user;
pub mod token_descriptors;

use incremental::{append, fetch_page, read_rows, replace, AntiJoin, RowBatch};

/// Where a builder reads its upstream rows from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Every column of an upstream table or view
    Table(&'static str),
    /// A `SELECT` statement over upstream tables
    Query(String),
    /// The builder produces its rows without reading the database
    Generated,
}

impl Source {
    /// SQL usable in a `FROM` clause, if the source reads the database
    #[must_use]
    pub fn relation_sql(&self) -> Option<String> {
        match self {
            Self::Table(name) => Some(quote_ident(name)),
            Self::Query(sql) => Some(format!("({sql})")),
            Self::Generated => None,
        }
    }
}

/// Computes the rows of one staging table
pub trait StagingBuilder {
    /// Name of the staging table this builder writes
    fn name(&self) -> &'static str;

    /// Register SQL functions the source query relies on
    fn register_functions(&self, _conn: &Connection) -> Result<()> {
        Ok(())
    }

    /// Upstream rows fed to [`StagingBuilder::transform`]
    fn source(&self) -> Source;

    /// Columns identifying rows that were already processed.
    ///
    /// The names must be present both in the upstream rows and in the
    /// destination. Required for append-mode tables.
    fn natural_key(&self) -> &'static [&'static str] {
        &[]
    }

    /// Turn upstream rows into destination rows
    fn transform(&self, input: RowBatch) -> Result<RowBatch>;
}

/// The default builders for every staging table in `config/schema/staging_tables.json`
pub fn default_builders(
    tokens: TokenPipeline,
    lexicon: Box<dyn Lexicon>,
) -> Result<Vec<Box<dyn StagingBuilder>>> {
    Ok(vec![
        Box::new(emoji_text_map::EmojiTextMapBuilder),
        Box::new(message_user::MessageUserBuilder),
        Box::new(message_tokens::MessageTokensBuilder::new(tokens)),
        Box::new(message_emoji::MessageEmojiBuilder),
        Box::new(token_descriptors::TokenDescriptorsBuilder::new(lexicon)?),
        Box::new(contact_stats::ContactStatsBuilder),
    ])
}

struct StagingStep {
    definition: StagingTableDefinition,
    builder: Box<dyn StagingBuilder>,
}

/// Ordered staging tables, ready to run
pub struct StagingGraph {
    steps: Vec<StagingStep>,
    batch_size: usize,
    metrics: PipelineMetrics,
}

impl StagingGraph {
    /// Pair definitions with builders and fix the execution order.
    ///
    /// Fails when a definition has no builder or a builder has no definition,
    /// when an append-mode table has no usable natural key, and when the
    /// references cannot be ordered.
    pub fn new(
        definitions: &[StagingTableDefinition],
        builders: Vec<Box<dyn StagingBuilder>>,
        order: ExecutionOrder,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(EtlError::InvalidDefinition(
                "staging batch size must be greater than 0".to_string(),
            ));
        }

        let mut by_name: HashMap<&'static str, Box<dyn StagingBuilder>> = HashMap::new();
        for builder in builders {
            let name = builder.name();
            if by_name.insert(name, builder).is_some() {
                return Err(EtlError::DuplicateDefinition {
                    name: name.to_string(),
                    first: "builders".to_string(),
                    second: "builders".to_string(),
                });
            }
        }

        let mut steps = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let builder = by_name.remove(definition.name()).ok_or_else(|| {
                EtlError::InvalidDefinition(format!(
                    "staging table '{}' has no builder",
                    definition.name()
                ))
            })?;
            check_builder(definition, builder.as_ref())?;
            steps.push(StagingStep {
                definition: definition.clone(),
                builder,
            });
        }

        if let Some(orphan) = by_name.keys().min() {
            return Err(EtlError::InvalidDefinition(format!(
                "builder '{orphan}' has no staging table definition"
            )));
        }

        let order = match order {
            ExecutionOrder::Dependency => dependency_order(&steps)?,
            ExecutionOrder::Declared => declared_order(&steps)?,
        };
        let mut slots: Vec<Option<StagingStep>> = steps.into_iter().map(Some).collect();
        let steps = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();

        Ok(Self {
            steps,
            batch_size,
            metrics: PipelineMetrics::default(),
        })
    }

    /// Table names in execution order
    #[must_use]
    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.definition.name()).collect()
    }

    /// Build every staging table in order, halting at the first failure
    pub fn run(&self, conn: &mut Connection) -> Result<Vec<BuildReport>> {
        let timer = OperationTimer::new("staging");
        let mut reports = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            match self.build(conn, step) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(table = step.definition.name(), error = %e, "Staging build failed");
                    self.metrics.record_build_failure(step.definition.name());
                    return Err(e);
                },
            }
        }
        timer.finish();
        Ok(reports)
    }

    #[instrument(skip_all, fields(table = step.definition.name()))]
    fn build(&self, conn: &mut Connection, step: &StagingStep) -> Result<BuildReport> {
        let definition = &step.definition;
        check_references(conn, definition)?;
        step.builder.register_functions(conn)?;

        let started = Instant::now();
        let mut report = BuildReport {
            table: definition.name().to_string(),
            mode: definition.write_mode,
            input_rows: 0,
            output_rows: 0,
            skipped_existing: 0,
            inserted: 0,
            batches: 0,
            duration_ms: 0,
        };

        match definition.write_mode {
            WriteMode::Append => self.build_append(conn, step, &mut report)?,
            WriteMode::Replace => build_replace(conn, step, &mut report)?,
        }

        let elapsed = started.elapsed();
        report.duration_ms = elapsed.as_millis();
        self.metrics.record_build(
            definition.name(),
            report.inserted,
            report.skipped_existing,
            elapsed,
        );
        info!(
            table = definition.name(),
            mode = definition.write_mode.as_str(),
            input_rows = report.input_rows,
            inserted = report.inserted,
            skipped_existing = report.skipped_existing,
            duration_ms = report.duration_ms,
            "Built staging table"
        );
        Ok(report)
    }

    fn build_append(
        &self,
        conn: &mut Connection,
        step: &StagingStep,
        report: &mut BuildReport,
    ) -> Result<()> {
        let definition = &step.definition;
        let key = step.builder.natural_key();
        let relation = step.builder.source().relation_sql().ok_or_else(|| {
            EtlError::InvalidDefinition(format!(
                "append-mode table '{}' needs a database source",
                definition.name()
            ))
        })?;
        let anti_join = AntiJoin::new(&relation, definition.name(), key);

        let mut cursor: Option<Vec<Value>> = None;
        loop {
            let page = fetch_page(conn, &anti_join, cursor.as_deref(), self.batch_size)?;
            if page.rows.is_empty() {
                break;
            }
            report.batches += 1;
            report.input_rows += page.rows.len() as u64;

            let output = step.builder.transform(page.rows)?;
            report.output_rows += output.len() as u64;

            let outcome = append(conn, definition, key, output)?;
            report.inserted += outcome.inserted;
            report.skipped_existing += outcome.skipped_existing;

            if page.distinct_keys < self.batch_size {
                break;
            }
            cursor = page.last_key;
        }
        Ok(())
    }
}

fn build_replace(conn: &mut Connection, step: &StagingStep, report: &mut BuildReport) -> Result<()> {
    let input = match step.builder.source().relation_sql() {
        Some(relation) => read_rows(conn, &format!("SELECT * FROM {relation} AS s"), &[])?,
        None => RowBatch::default(),
    };
    report.batches = 1;
    report.input_rows = input.len() as u64;

    let output = step.builder.transform(input)?;
    report.output_rows = output.len() as u64;
    report.inserted = replace(conn, &step.definition, &output)?;
    Ok(())
}

fn check_builder(definition: &StagingTableDefinition, builder: &dyn StagingBuilder) -> Result<()> {
    let key = builder.natural_key();
    if let Some(column) = key.iter().find(|k| !definition.spec.has_column(k)) {
        return Err(EtlError::InvalidDefinition(format!(
            "natural key column '{column}' of '{}' is not in its columnspec",
            definition.name()
        )));
    }
    if definition.write_mode == WriteMode::Append {
        if key.is_empty() {
            return Err(EtlError::InvalidDefinition(format!(
                "append-mode table '{}' has a builder without a natural key",
                definition.name()
            )));
        }
        if builder.source() == Source::Generated {
            return Err(EtlError::InvalidDefinition(format!(
                "append-mode table '{}' needs a database source",
                definition.name()
            )));
        }
    }
    Ok(())
}

/// Every reference must be an existing table or view before the builder runs
fn check_references(conn: &Connection, definition: &StagingTableDefinition) -> Result<()> {
    let mut missing = Vec::new();
    for reference in &definition.references {
        if !relation_exists(conn, reference)? {
            missing.push(reference.clone());
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EtlError::MissingReference {
            table: definition.name().to_string(),
            missing,
        })
    }
}

/// Topological order over staging-to-staging references; ties keep declaration order
fn dependency_order(steps: &[StagingStep]) -> Result<Vec<usize>> {
    let mut graph = Graph::<usize, (), Directed>::new();
    let nodes: Vec<NodeIndex> = (0..steps.len()).map(|i| graph.add_node(i)).collect();
    let index: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.definition.name(), i))
        .collect();

    for (i, step) in steps.iter().enumerate() {
        for reference in &step.definition.references {
            if let Some(&upstream) = index.get(reference.as_str()) {
                graph.update_edge(nodes[upstream], nodes[i], ());
            }
        }
    }

    let mut in_degree: Vec<usize> = nodes
        .iter()
        .map(|&n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(steps.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for next in graph.neighbors_directed(nodes[i], Direction::Outgoing) {
            let j = graph[next];
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }

    if order.len() < steps.len() {
        let cycle = tarjan_scc(&graph)
            .into_iter()
            .find(|component| component.len() > 1)
            .map(|component| {
                let mut members: Vec<usize> = component.into_iter().map(|n| graph[n]).collect();
                members.sort_unstable();
                let mut names: Vec<String> = members
                    .iter()
                    .map(|&i| steps[i].definition.name().to_string())
                    .collect();
                if let Some(first) = names.first().cloned() {
                    names.push(first);
                }
                names
            })
            .unwrap_or_default();
        return Err(EtlError::DependencyCycle(cycle));
    }
    Ok(order)
}

/// Declaration order, checked so that no table runs before a staging table it references
fn declared_order(steps: &[StagingStep]) -> Result<Vec<usize>> {
    let index: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.definition.name(), i))
        .collect();
    for (i, step) in steps.iter().enumerate() {
        for reference in &step.definition.references {
            if index.get(reference.as_str()).is_some_and(|&upstream| upstream > i) {
                return Err(EtlError::DependencyOrder {
                    table: step.definition.name().to_string(),
                    reference: reference.clone(),
                });
            }
        }
    }
    Ok((0..steps.len()).collect())
}
