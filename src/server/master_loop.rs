// src/server/master_loop.rs

//! The single mutation thread: owns `AssignmentTable` and `ServerRegistry`
//! exclusively and is the only task that ever calls their mutating methods.
//!
//! Each iteration drains one of two inputs: the `RpcCall` channel (admin
//! DDL and the `Report` heartbeat, both of which need a synchronous typed
//! reply) and the `OperationQueue` (fire-and-forget events: startups,
//! deaths, split/open/close notifications). `RpcCall`s are polled with
//! priority since their callers are blocked waiting on them.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::assign::Assigner;
use crate::core::assignment::{AssignmentState, AssignmentTable};
use crate::core::coord::CoordClient;
use crate::core::errors::{ErrorClass, MasterError, classify};
use crate::core::locality::LocalityOracle;
use crate::core::logsplit::LogSplitter;
use crate::core::metrics;
use crate::core::queue::{OperationItem, OperationQueue, ProcessOutcome, QueuedItem, ReportMessage};
use crate::core::region::{Region, TableSchema};
use crate::core::registry::ServerRegistry;
use crate::core::tableops::TableOps;
use crate::server::rpc::{AlterStatusReply, ClusterStatus, RpcCall};

/// The master's overall lifecycle state, collapsing the source's
/// separately guarded `closed`/`shutdown_requested` flags into one state
/// with a `Draining` sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Draining,
    Closed,
}

/// Everything the control loop owns exclusively. RPC handlers never reach
/// into this struct directly; they only hold an `OperationQueueHandle`
/// reach into it directly.
pub struct MasterCore {
    pub assignment: AssignmentTable,
    pub registry: ServerRegistry,
    pub oracle: LocalityOracle,
    pub assigner: Assigner,
    pub logsplit: LogSplitter,
    pub tableops: TableOps,
    pub coord: Arc<dyn CoordClient>,
    pub config: Config,
    pub master_started_at: Instant,
    pub run_state: RunState,
    pub next_region_id: u64,
    /// `table_name -> region_ids`, this crate's stand-in for scanning META
    /// (a region hosted on a live server, whose storage format is out of
    /// scope for this crate). `TableOps` itself holds no state; this map
    /// is the catalog `MasterCore` consults on its behalf.
    pub catalog: DashMap<String, Vec<u64>>,
}

impl MasterCore {
    /// Runs until `run_state` becomes `Closed`. Each iteration: if
    /// `Draining` and the registry is empty, transitions to `Closed`; pops
    /// one item with a `thread_wake_frequency` timeout; processes it; on
    /// `Failed`, exits; on `RequeuedButProblem`, treats it as a DFS-health
    /// signal.
    pub async fn run(&mut self, mut queue: OperationQueue, mut rpc_rx: mpsc::Receiver<RpcCall>) {
        loop {
            if self.run_state == RunState::Draining && self.registry.is_empty() {
                self.run_state = RunState::Closed;
            }
            if self.run_state == RunState::Closed {
                if let Err(e) = self.oracle.save_snapshot().await {
                    warn!(error = %e, "failed to persist the locality snapshot on exit");
                }
                info!("master loop exiting");
                return;
            }

            let queued = tokio::select! {
                biased;
                Some(call) = rpc_rx.recv() => {
                    self.handle_rpc(call).await;
                    continue;
                }
                item = queue.recv(self.config.thread_wake_frequency) => item,
            };
            let Some(queued) = queued else {
                self.check_expired_servers().await;
                continue;
            };

            if matches!(queued.item, OperationItem::Shutdown) {
                self.run_state = RunState::Closed;
                continue;
            }

            let outcome = self.process(&queued.item).await;
            metrics::QUEUE_ITEMS_PROCESSED_TOTAL
                .with_label_values(&[outcome_label(outcome)])
                .inc();

            match outcome {
                ProcessOutcome::Failed => {
                    error!("operation permanently failed; master loop exiting for operator intervention");
                    self.run_state = RunState::Closed;
                }
                ProcessOutcome::Requeued => {
                    let _ = queue.requeue(queued).await;
                }
                ProcessOutcome::RequeuedButProblem => {
                    if let Err(e) = self.check_file_system().await {
                        error!(error = %e, "DFS health check failed after a problem requeue");
                        self.run_state = RunState::Closed;
                    } else {
                        let _ = queue.requeue(queued).await;
                    }
                }
                ProcessOutcome::Processed | ProcessOutcome::Noop => {}
            }
        }
    }

    /// Processes one `OperationItem`, returning its outcome. I/O and
    /// coordination errors inside are classified via
    /// `classify()`: transient becomes `Requeued`, fatal sets `Closed` and
    /// returns `Failed`.
    async fn process(&mut self, item: &OperationItem) -> ProcessOutcome {
        let result = self.process_inner(item).await;
        match result {
            Ok(outcome) => outcome,
            Err(err) => match classify(&err) {
                ErrorClass::Transient => {
                    warn!(error = %err, "transient error processing operation item, will requeue");
                    ProcessOutcome::Requeued
                }
                ErrorClass::Fatal => {
                    error!(error = %err, "fatal error processing operation item");
                    self.run_state = RunState::Closed;
                    ProcessOutcome::Failed
                }
            },
        }
    }

    async fn process_inner(&mut self, item: &OperationItem) -> Result<ProcessOutcome, MasterError> {
        match item {
            OperationItem::ProcessServerStartup { server } => {
                metrics::SERVER_STARTUPS_TOTAL.inc();
                let superseded = self.registry.record_startup(server.clone(), false);
                if let Some(old_name) = superseded {
                    self.handle_server_death(&old_name).await?;
                }
                self.run_assignment_cycle().await?;
                Ok(ProcessOutcome::Processed)
            }
            OperationItem::ProcessServerDeath { server_name } => {
                self.handle_server_death(server_name).await?;
                Ok(ProcessOutcome::Processed)
            }
            OperationItem::ProcessRegionSplit {
                parent_region_id,
                daughter_region_ids,
            } => {
                self.apply_region_split(*parent_region_id, *daughter_region_ids);
                Ok(ProcessOutcome::Processed)
            }
            OperationItem::ProcessRegionOpened { region_id, server_name } => {
                self.apply_region_opened(*region_id, server_name)?;
                Ok(ProcessOutcome::Processed)
            }
            OperationItem::ProcessRegionClosed { region_id } => {
                self.apply_region_closed(*region_id).await?;
                Ok(ProcessOutcome::Processed)
            }
            OperationItem::AdminAction(action) => {
                self.tableops
                    .modify_table(action.clone(), &self.assignment, &self.oracle)?;
                Ok(ProcessOutcome::Processed)
            }
            OperationItem::Shutdown => Ok(ProcessOutcome::Processed),
        }
    }

    fn apply_region_opened(&mut self, region_id: u64, server_name: &str) -> Result<(), MasterError> {
        self.assignment
            .set_state(region_id, AssignmentState::Open, Some(server_name.to_string()))?;
        self.assigner.forget(region_id);
        metrics::ASSIGNMENT_TRANSITIONS_TOTAL.with_label_values(&["open"]).inc();
        Ok(())
    }

    async fn apply_region_closed(&mut self, region_id: u64) -> Result<(), MasterError> {
        self.assignment.set_state(region_id, AssignmentState::Closed, None)?;
        self.assignment.set_state(region_id, AssignmentState::Unassigned, None)?;
        metrics::ASSIGNMENT_TRANSITIONS_TOTAL.with_label_values(&["closed"]).inc();
        self.run_assignment_cycle().await
    }

    fn apply_region_split(&mut self, parent_region_id: u64, daughter_region_ids: (u64, u64)) {
        self.assignment.remove(parent_region_id);
        self.assigner.forget(parent_region_id);
        metrics::ASSIGNMENT_TRANSITIONS_TOTAL.with_label_values(&["split"]).inc();
        let _ = daughter_region_ids;
    }

    /// Applies one message piggybacked on a `Report`, the live path that
    /// actually drives `PENDING_OPEN -> OPEN` (and closed/split) rather
    /// than relying on a test manually enqueuing the equivalent
    /// `OperationItem`.
    async fn apply_report_message(&mut self, server_name: &str, msg: ReportMessage) -> Result<(), MasterError> {
        match msg {
            ReportMessage::RegionOpened { region_id } => self.apply_region_opened(region_id, server_name),
            ReportMessage::RegionClosed { region_id } => self.apply_region_closed(region_id).await,
            ReportMessage::RegionSplit { parent_region_id, daughter_region_ids } => {
                self.apply_region_split(parent_region_id, daughter_region_ids);
                Ok(())
            }
        }
    }

    /// Moves every region held by `server_name` to `UNASSIGNED` and queues
    /// its WAL directory for splitting. `server_name`'s `ServerInfo` stays
    /// in the registry, marked dead, until recovery completes — per §3's
    /// lifecycle ("destroyed after the session expires AND log-split
    /// recovery has completed") — so it is still visible in
    /// `get_cluster_status`'s `dead_servers` while recovery is in flight.
    async fn handle_server_death(&mut self, server_name: &str) -> Result<(), MasterError> {
        metrics::SERVER_DEATHS_TOTAL.inc();
        let regions = self.assignment.regions_of(server_name);
        for r in &regions {
            self.assignment.clear_in_transition(r.region_id);
        }
        self.registry.mark_dead(server_name);

        let rootdir = self.config.rootdir.clone();
        let server_name_owned = server_name.to_string();
        let split_result = self
            .logsplit
            .recover_server(&server_name_owned, move |split_dir| async move {
                let _ = (&rootdir, &split_dir);
                Ok(crate::core::logsplit::SplitOutcome {
                    duration: std::time::Duration::from_secs(0),
                    file_count: 0,
                    bytes: 0,
                })
            })
            .await;

        match split_result {
            Ok(_) => {
                self.registry.remove(server_name);
                self.run_assignment_cycle().await
            }
            Err(e) => {
                // Leave the dead entry in the registry and the log
                // directory in place; the next startup attempt for this
                // server (or a future death-processing retry) will find it
                // and try again.
                self.run_assignment_cycle().await?;
                Err(e)
            }
        }
    }

    /// Called whenever `queue.recv` times out with nothing ready: sweeps
    /// `ServerRegistry` for any server whose last `Report` is older than
    /// `rs_lease_timeout` and runs the same death handling a coordination
    /// session-loss event would have triggered.
    async fn check_expired_servers(&mut self) {
        let newly_dead = self.registry.expire_stale(self.config.rs_lease_timeout);
        for server_name in newly_dead {
            if let Err(e) = self.handle_server_death(&server_name).await {
                warn!(server = server_name, error = %e, "failed to process an expired server's death");
            }
        }
        self.check_lost_directives();
    }

    /// Open-region directives for which no confirming `Report` arrived
    /// within `assignment_timeout` are reverted to `UNASSIGNED` and backed
    /// off, so the next assignment cycle retries them on a (possibly
    /// different) server instead of leaving them stuck in `PENDING_OPEN`
    /// forever.
    fn check_lost_directives(&mut self) {
        let lost = self.assigner.sweep_lost_directives(&self.assignment, self.config.assignment_timeout);
        if !lost.is_empty() {
            metrics::DIRECTIVES_LOST_TOTAL.inc_by(lost.len() as f64);
            warn!(regions = ?lost, "open-region directives timed out; reverted to unassigned");
        }
    }

    async fn run_assignment_cycle(&mut self) -> Result<(), MasterError> {
        match self.assigner.run_cycle(
            &self.assignment,
            &self.registry,
            &self.oracle,
            self.master_started_at,
            self.config.apply_preferred_period,
            self.config.hold_for_locality_period,
        ) {
            Ok(_placed) => Ok(()),
            Err(MasterError::InsufficientServers) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn check_file_system(&self) -> Result<(), MasterError> {
        match tokio::fs::metadata(&self.config.rootdir).await {
            Ok(_) => Ok(()),
            Err(_) => Err(MasterError::FatalDfsUnavailable),
        }
    }

    /// Sets the cluster-wide shutdown flag (phase one of the two-phase
    /// shutdown); the loop itself transitions to `Closed` once the
    /// registry drains.
    pub async fn begin_shutdown(&mut self) -> Result<(), MasterError> {
        self.run_state = RunState::Draining;
        self.coord
            .create_ephemeral(
                &crate::server::paths::shutdown_flag(&self.config.root_znode),
                bytes::Bytes::new(),
            )
            .await
    }

    fn regions_of_table(&self, table_name: &str) -> Vec<Region> {
        self.catalog
            .get(table_name)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.assignment.get(*id).map(|e| e.region))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Dispatches one admin-facing `RpcCall`. Runs on the loop thread like
    /// every other mutation: `TableOps` itself is stateless, so
    /// `MasterCore` supplies the catalog and assignment table it operates
    /// over and replies on the caller's `oneshot` channel.
    async fn handle_rpc(&mut self, call: RpcCall) {
        match call {
            RpcCall::CreateTable { table_name, schema, split_keys, reply } => {
                metrics::TABLE_OPS_TOTAL.with_label_values(&["create"]).inc();
                let catalog = &self.catalog;
                let result = self
                    .tableops
                    .create_table(
                        &table_name,
                        schema,
                        &split_keys,
                        &self.registry,
                        true,
                        &self.assignment,
                        self.next_region_id,
                        |name| catalog.contains_key(name),
                    )
                    .await;
                match result {
                    Ok(regions) => {
                        self.next_region_id += regions.len() as u64;
                        self.catalog.insert(table_name, regions.iter().map(|r| r.region_id).collect());
                        let _ = self.run_assignment_cycle().await;
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            RpcCall::DeleteTable { table_name, reply } => {
                metrics::TABLE_OPS_TOTAL.with_label_values(&["delete"]).inc();
                let regions = self.regions_of_table(&table_name);
                let result = self.tableops.delete_table(&table_name, &regions, &self.assignment);
                if result.is_ok() {
                    self.catalog.remove(&table_name);
                }
                let _ = reply.send(result);
            }
            RpcCall::EnableTable { table_name, reply } => {
                metrics::TABLE_OPS_TOTAL.with_label_values(&["enable"]).inc();
                let regions = self.regions_of_table(&table_name);
                let result = self.tableops.enable_table(&table_name, &regions, &self.assignment);
                if result.is_ok() {
                    let _ = self.run_assignment_cycle().await;
                }
                let _ = reply.send(result);
            }
            RpcCall::DisableTable { table_name, reply } => {
                metrics::TABLE_OPS_TOTAL.with_label_values(&["disable"]).inc();
                let regions = self.regions_of_table(&table_name);
                let result = self.tableops.disable_table(&table_name, &regions, &self.assignment);
                let _ = reply.send(result);
            }
            RpcCall::ModifyTable { table_name, action, reply } => {
                metrics::TABLE_OPS_TOTAL.with_label_values(&["modify"]).inc();
                let result = self.tableops.modify_table(action, &self.assignment, &self.oracle);
                let _ = table_name;
                let _ = reply.send(result);
            }
            RpcCall::AlterTable { table_name, edits, reply } => {
                metrics::TABLE_OPS_TOTAL.with_label_values(&["alter"]).inc();
                let regions = self.regions_of_table(&table_name);
                let result = self.tableops.alter_table(&table_name, &regions, &edits, &self.assignment);
                let _ = reply.send(result);
            }
            RpcCall::GetAlterStatus { table_name, reply } => {
                let regions = self.regions_of_table(&table_name);
                let status = self.tableops.get_alter_status(&regions, &self.assignment);
                let _ = reply.send(Ok(AlterStatusReply { pending: status.pending, total: status.total }));
            }
            RpcCall::GetClusterStatus { reply } => {
                let live = self.registry.live_servers();
                let status = ClusterStatus {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    servers: live.keys().cloned().collect(),
                    dead_servers: self.registry.dead_servers(),
                    regions_in_transition: self
                        .assignment
                        .in_transition()
                        .iter()
                        .map(|e| e.region.region_id)
                        .collect(),
                };
                let _ = reply.send(status);
            }
            RpcCall::RegionServerReport { server_name, load, msgs, reply } => {
                for msg in msgs {
                    if let Err(e) = self.apply_report_message(&server_name, msg).await {
                        warn!(server = %server_name, error = %e, "failed to apply a region-server report message");
                    }
                }
                let directives = self.registry.record_report(&server_name, load);
                let _ = reply.send(directives);
            }
            RpcCall::Shutdown => {
                let _ = self.begin_shutdown().await;
            }
            RpcCall::StopMaster => {
                self.run_state = RunState::Closed;
            }
        }
    }
}

/// Builds the schema for a new table from a column-family list, the shape
/// admin clients pass across the RPC surface's `create_table(descriptor,
/// ...)` call.
pub fn simple_schema(table_name: &str, column_families: Vec<String>) -> TableSchema {
    TableSchema::new(table_name, column_families)
}

fn outcome_label(outcome: ProcessOutcome) -> &'static str {
    match outcome {
        ProcessOutcome::Processed => "processed",
        ProcessOutcome::Noop => "noop",
        ProcessOutcome::Requeued => "requeued",
        ProcessOutcome::RequeuedButProblem => "requeued_but_problem",
        ProcessOutcome::Failed => "failed",
    }
}
