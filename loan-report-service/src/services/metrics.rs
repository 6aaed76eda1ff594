//! Prometheus metrics for loan-report-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "loan_report_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for processed source reports by outcome.
pub static REPORTS_PROCESSED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "loan_report_reports_processed_total",
        "Total number of source reports processed",
        &["status"]
    )
    .expect("Failed to register REPORTS_PROCESSED")
});

/// Counter for mapper entries by step and outcome (inserted, skipped, failed).
pub static INGEST_ENTRIES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "loan_report_ingest_entries_total",
        "Total number of document entries handled by the mapper",
        &["step", "outcome"]
    )
    .expect("Failed to register INGEST_ENTRIES")
});

/// Counter for report download attempts by outcome.
pub static DOWNLOAD_ATTEMPTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "loan_report_download_attempts_total",
        "Total number of report download attempts",
        &["outcome"]
    )
    .expect("Failed to register DOWNLOAD_ATTEMPTS")
});

/// Gauge for bulk batches currently held in the registry.
pub static BULK_BATCHES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "loan_report_bulk_batches",
        "Number of bulk batches tracked in memory"
    )
    .expect("Failed to register BULK_BATCHES")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "loan_report_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&REPORTS_PROCESSED);
    Lazy::force(&INGEST_ENTRIES);
    Lazy::force(&DOWNLOAD_ATTEMPTS);
    Lazy::force(&BULK_BATCHES);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_report_processed(status: &str) {
    REPORTS_PROCESSED.with_label_values(&[status]).inc();
}

pub fn record_ingest_entry(step: &str, outcome: &str) {
    INGEST_ENTRIES.with_label_values(&[step, outcome]).inc();
}

pub fn record_download_attempt(outcome: &str) {
    DOWNLOAD_ATTEMPTS.with_label_values(&[outcome]).inc();
}

pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
