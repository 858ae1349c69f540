// src/core/metrics.rs

//! Defines and registers Prometheus metrics for the master control plane.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only
//! once globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};
use std::time::Duration;

lazy_static! {
    // --- Cluster-wide gauges ---
    /// The number of region servers currently considered live.
    pub static ref LIVE_SERVERS: Gauge =
        register_gauge!("tablemaster_live_servers", "Number of live region servers.").unwrap();
    /// The number of regions currently in a transitional assignment state.
    pub static ref REGIONS_IN_TRANSITION: Gauge =
        register_gauge!("tablemaster_regions_in_transition", "Number of regions in PENDING_OPEN/PENDING_CLOSE.").unwrap();
    /// 1 if this process holds the master lock, 0 otherwise.
    pub static ref IS_ACTIVE_MASTER: Gauge =
        register_gauge!("tablemaster_is_active_master", "Whether this process is the active master (1) or a standby (0).").unwrap();

    // --- Assignment counters ---
    /// Total number of region assignment transitions, labeled by target state.
    pub static ref ASSIGNMENT_TRANSITIONS_TOTAL: CounterVec =
        register_counter_vec!("tablemaster_assignment_transitions_total", "Total assignment state transitions, labeled by target state.", &["state"]).unwrap();
    /// Total number of open-region directives lost to a missed heartbeat.
    pub static ref DIRECTIVES_LOST_TOTAL: Counter =
        register_counter!("tablemaster_directives_lost_total", "Total open-region directives not confirmed before timing out.").unwrap();

    // --- Server lifecycle counters ---
    /// Total number of region servers that have registered via Startup.
    pub static ref SERVER_STARTUPS_TOTAL: Counter =
        register_counter!("tablemaster_server_startups_total", "Total region server Startup RPCs processed.").unwrap();
    /// Total number of region servers marked dead.
    pub static ref SERVER_DEATHS_TOTAL: Counter =
        register_counter!("tablemaster_server_deaths_total", "Total region servers marked dead.").unwrap();

    // --- Log split metrics ---
    /// Total number of completed WAL log splits.
    pub static ref LOG_SPLITS_TOTAL: Counter =
        register_counter!("tablemaster_log_splits_total", "Total completed WAL log splits.").unwrap();
    /// Total number of WAL files processed across all splits.
    pub static ref LOG_SPLIT_FILES_TOTAL: Counter =
        register_counter!("tablemaster_log_split_files_total", "Total WAL files processed across all log splits.").unwrap();
    /// Total number of bytes processed across all log splits.
    pub static ref LOG_SPLIT_BYTES_TOTAL: Counter =
        register_counter!("tablemaster_log_split_bytes_total", "Total bytes processed across all log splits.").unwrap();
    /// Duration of a single WAL log split.
    pub static ref LOG_SPLIT_DURATION_SECONDS: Histogram =
        register_histogram!("tablemaster_log_split_duration_seconds", "Duration of one server's WAL log split.").unwrap();

    // --- Operation queue ---
    /// Total operation items processed, labeled by outcome.
    pub static ref QUEUE_ITEMS_PROCESSED_TOTAL: CounterVec =
        register_counter_vec!("tablemaster_queue_items_processed_total", "Total OperationItems processed, labeled by outcome.", &["outcome"]).unwrap();

    // --- Table DDL ---
    /// Total table DDL operations, labeled by kind.
    pub static ref TABLE_OPS_TOTAL: CounterVec =
        register_counter_vec!("tablemaster_table_ops_total", "Total table DDL operations, labeled by kind.", &["kind"]).unwrap();
}

/// Records the outcome of one completed WAL log split.
pub fn record_log_split(duration: Duration, file_count: u64, bytes: u64) {
    LOG_SPLITS_TOTAL.inc();
    LOG_SPLIT_FILES_TOTAL.inc_by(file_count as f64);
    LOG_SPLIT_BYTES_TOTAL.inc_by(bytes as f64);
    LOG_SPLIT_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
