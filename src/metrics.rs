//! Prometheus metrics wiring

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::errors::{AppError, Result};

/// Install the global Prometheus recorder and return the render handle
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::Configuration {
            message: format!("failed to install metrics recorder: {}", e),
        })
}

/// Register descriptions for every metric the service emits
pub fn describe() {
    describe_counter!("askdoc_runs_total", "Pipeline runs started");
    describe_counter!("askdoc_chunks_total", "Chunks produced across all runs");
    describe_counter!(
        "askdoc_index_chunks_failed_total",
        "Chunks that failed to embed or index"
    );
    describe_counter!("askdoc_questions_total", "Questions answered across all runs");
    describe_histogram!(
        "askdoc_run_duration_seconds",
        "Wall-clock duration of a full pipeline run"
    );
}
