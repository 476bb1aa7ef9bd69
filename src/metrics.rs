use metrics::{counter, histogram};
use std::time::Duration;

/// Metric names emitted by the pipeline.
///
/// Nothing is recorded unless the embedding application installs a
/// `metrics` recorder.
pub struct PipelineMetrics {
    // Mirror metrics
    pub tables_mirrored_total: &'static str,
    pub rows_mirrored_total: &'static str,

    // Staging metrics
    pub rows_appended_total: &'static str,
    pub rows_skipped_existing_total: &'static str,
    pub build_duration: &'static str,

    // Error metrics
    pub builds_failed_total: &'static str,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            tables_mirrored_total: "txt_history_tables_mirrored_total",
            rows_mirrored_total: "txt_history_rows_mirrored_total",

            rows_appended_total: "txt_history_staging_rows_appended_total",
            rows_skipped_existing_total: "txt_history_staging_rows_skipped_existing_total",
            build_duration: "txt_history_staging_build_duration_seconds",

            builds_failed_total: "txt_history_staging_builds_failed_total",
        }
    }
}

impl PipelineMetrics {
    /// Record one mirrored table
    pub fn record_table_mirrored(&self, table: &str, rows: u64) {
        counter!(self.tables_mirrored_total).increment(1);
        counter!(self.rows_mirrored_total, "table" => table.to_string()).increment(rows);
    }

    /// Record a finished staging build
    pub fn record_build(&self, table: &str, inserted: u64, skipped: u64, duration: Duration) {
        let label = table.to_string();
        counter!(self.rows_appended_total, "table" => label.clone()).increment(inserted);
        counter!(self.rows_skipped_existing_total, "table" => label.clone()).increment(skipped);
        histogram!(self.build_duration, "table" => label).record(duration.as_secs_f64());
    }

    /// Record a failed staging build
    pub fn record_build_failure(&self, table: &str) {
        counter!(self.builds_failed_total, "table" => table.to_string()).increment(1);
    }
}
