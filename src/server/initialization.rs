// src/server/initialization.rs

//! Handles master startup: opening a coordination-store session, winning
//! leader election, and bootstrapping or reconstructing cluster state
//! before the control loop takes over.

use anyhow::Result;
use dashmap::DashMap;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::assign::Assigner;
use crate::core::assignment::AssignmentTable;
use crate::core::coord::{CoordClient, CoordEvent};
use crate::core::coord::memory::{InMemoryCoordClient, SharedStore};
use crate::core::locality::LocalityOracle;
use crate::core::logsplit::LogSplitter;
use crate::core::queue::{OperationItem, OperationQueue};
use crate::core::registry::ServerRegistry;
use crate::core::tableops::TableOps;
use crate::server::master_loop::{MasterCore, RunState};
use crate::server::rpc::{MasterHandle, RegionServerGateway, RpcCall};
use crate::server::{bootstrap, election, paths};

/// Everything `server::run` needs to hand off to the control loop, plus the
/// admin-facing handle a caller (or a `ctrl_c` shutdown task) can use to
/// reach it.
pub struct ServerContext {
    pub master: MasterCore,
    pub queue: OperationQueue,
    pub rpc_rx: mpsc::Receiver<RpcCall>,
    pub handle: MasterHandle,
    pub rs_gateway: RegionServerGateway,
}

/// Runs the sequence spec'd for master startup: version-marker check,
/// leader election, then cluster-starter bootstrap or failover
/// reconstruction depending on what the election observed.
///
/// The coordination store and DFS are external collaborators this crate
/// does not implement; `setup` uses [`InMemoryCoordClient`] as the
/// single-node development stand-in described on that type.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);

    let rootdir = PathBuf::from(&config.rootdir);
    bootstrap::check_or_write_version_marker(&rootdir).await?;

    let store = SharedStore::new();
    let coord: Arc<dyn CoordClient> = Arc::new(InMemoryCoordClient::new(store, std::process::id() as u64));

    let own_addr = format!("127.0.0.1:0-{}", std::process::id());
    election::run(
        &coord,
        &config.root_znode,
        &own_addr,
        config.backup,
        config.session_timeout,
    )
    .await?;
    info!(addr = %own_addr, "won master election");

    let cluster_starter = election::is_cluster_starter(&coord, &config.root_znode).await?;
    let assignment = AssignmentTable::new();
    let next_region_id = if cluster_starter {
        info!("region-server directory is empty; bootstrapping root and META regions");
        bootstrap::bootstrap_fresh_cluster(&assignment)
    } else {
        info!("region-server directory is non-empty; reconstructing assignment table via failover");
        bootstrap::reconstruct_via_failover(&coord, &config.root_znode, &assignment, None).await?
    };

    let oracle = LocalityOracle::new(
        paths::locality_snapshot(&rootdir),
        config.snapshot_validity,
        config.locality_scan_pool_size,
    );
    if let Err(e) = oracle.load_snapshot().await {
        warn!(error = %e, "failed to load the locality snapshot; starting with no preferred placements");
    }

    let (queue, queue_handle) = OperationQueue::new(config.queue_capacity, config.max_attempts);
    let (rpc_tx, rpc_rx) = mpsc::channel(config.queue_capacity.max(1));
    let handle = MasterHandle::new(rpc_tx.clone(), Arc::new(AtomicBool::new(true)));
    let rs_gateway = RegionServerGateway::new(
        queue_handle.clone(),
        rpc_tx,
        config.rootdir.clone(),
        format!("file://{}", config.rootdir),
    );

    spawn_session_watcher(coord.clone(), queue_handle);

    let master = MasterCore {
        assignment,
        registry: ServerRegistry::new(),
        oracle,
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
        next_region_id,
        catalog: DashMap::new(),
    };

    Ok(ServerContext {
        master,
        queue,
        rpc_rx,
        handle,
        rs_gateway,
    })
}

/// Folds this client's session-lifecycle stream into the same
/// `OperationQueue` every other producer feeds: a `SessionExpired` maps
/// 1:1 onto `OperationItem::Shutdown`, which `MasterLoop::run` treats as
/// fatal and exits on immediately rather than draining gracefully, so a
/// standby holding the master lock takes over.
fn spawn_session_watcher(coord: Arc<dyn CoordClient>, queue: crate::core::queue::OperationQueueHandle) {
    tokio::spawn(async move {
        let mut events = coord.session_events();
        while let Some(event) = events.next().await {
            if matches!(event, CoordEvent::SessionExpired) {
                error!("coordination session expired; exiting so a standby can take over");
                let _ = queue.enqueue(OperationItem::Shutdown).await;
                break;
            }
        }
    });
}

fn log_startup_info(config: &Config) {
    info!(
        rootdir = %config.rootdir,
        root_znode = %config.root_znode,
        backup = config.backup,
        min_servers = config.min_servers,
        "starting tablemaster"
    );
}
