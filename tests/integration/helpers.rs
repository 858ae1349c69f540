// tests/integration/helpers.rs

//! Shared fixtures for the integration suite: a fully wired `MasterCore`
//! over a throwaway rootdir, built the same way `server::initialization`
//! builds one but without going through leader election.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tablemaster::config::{Config, MetricsConfig};
use tablemaster::core::assign::Assigner;
use tablemaster::core::assignment::AssignmentTable;
use tablemaster::core::coord::CoordClient;
use tablemaster::core::coord::memory::{InMemoryCoordClient, SharedStore};
use tablemaster::core::locality::LocalityOracle;
use tablemaster::core::logsplit::LogSplitter;
use tablemaster::core::registry::ServerRegistry;
use tablemaster::core::tableops::TableOps;
use tablemaster::server::master_loop::{MasterCore, RunState};

pub fn test_config(rootdir: &std::path::Path) -> Config {
    Config {
        rootdir: rootdir.to_string_lossy().to_string(),
        root_znode: "/tablemaster".to_string(),
        backup: false,
        min_servers: 1,
        session_timeout: Duration::from_secs(30),
        thread_wake_frequency: Duration::from_millis(20),
        rs_lease_timeout: Duration::from_secs(90),
        assignment_timeout: Duration::from_secs(180),
        apply_preferred_period: Duration::from_secs(300),
        hold_for_locality_period: Duration::from_secs(60),
        snapshot_validity: Duration::from_secs(86400),
        locality_scan_pool_size: 5,
        num_retries: 2,
        retry_backoff: Duration::from_millis(1),
        max_concurrent_reopens: 8,
        queue_capacity: 64,
        max_attempts: 3,
        log_level: "info".to_string(),
        metrics: MetricsConfig::default(),
    }
}

/// Builds a `MasterCore` over `rootdir` with an empty `AssignmentTable`,
/// ready for a caller to bootstrap and drive directly (not via `run()`,
/// so tests can step through one item at a time with `process`/`handle_rpc`).
pub fn test_core(rootdir: PathBuf) -> MasterCore {
    let config = test_config(&rootdir);
    let store = SharedStore::new();
    let coord: Arc<dyn CoordClient> = Arc::new(InMemoryCoordClient::new(store, 1));
    MasterCore {
        assignment: AssignmentTable::new(),
        registry: ServerRegistry::new(),
        oracle: LocalityOracle::new(
            rootdir.join("locality.json"),
            config.snapshot_validity,
            config.locality_scan_pool_size,
        ),
        assigner: Assigner::new(),
        logsplit: LogSplitter::new(rootdir),
        tableops: TableOps::new(
            config.num_retries,
            config.retry_backoff,
            config.max_concurrent_reopens,
            config.min_servers,
        ),
        coord,
        config,
        master_started_at: Instant::now(),
        run_state: RunState::Running,
        next_region_id: 1,
        catalog: DashMap::new(),
    }
}
