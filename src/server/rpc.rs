// src/server/rpc.rs

//! RPC surface contracts: plain serde-derived types, not bound to any
//! transport. `MasterHandle` and `RegionServerGateway` are the in-process
//! entry points RPC handlers call: most enqueue an `RpcCall` and await a
//! `oneshot` reply, keeping the handler-enqueues/loop-processes separation
//! strict; `region_server_startup` alone goes through the plain
//! `OperationQueue` since nothing in its reply depends on loop state.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::core::errors::MasterError;
use crate::core::queue::{AdminAction, OperationItem, OperationQueueHandle, ReportMessage};
use crate::core::region::TableSchema;
use crate::core::registry::Directive;
use crate::core::server_info::{ServerInfo, ServerLoad};
use crate::core::tableops::AlterSpec;

/// The subset of config a region server receives from `Startup`'s reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupConfig {
    pub rootdir: String,
    pub fs_default_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub version: String,
    pub servers: Vec<String>,
    pub dead_servers: Vec<String>,
    pub regions_in_transition: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlterStatusReply {
    pub pending: usize,
    pub total: usize,
}

/// An `OperationItem` paired with a `oneshot` sender for its result, the
/// unit of work actually pushed through the queue by `MasterHandle`/
/// `RegionServerGateway` so the RPC caller can await a typed reply instead
/// of only a `ProcessOutcome`.
pub enum RpcCall {
    CreateTable {
        table_name: String,
        schema: TableSchema,
        split_keys: Vec<bytes::Bytes>,
        reply: oneshot::Sender<Result<(), MasterError>>,
    },
    DeleteTable {
        table_name: String,
        reply: oneshot::Sender<Result<(), MasterError>>,
    },
    EnableTable {
        table_name: String,
        reply: oneshot::Sender<Result<(), MasterError>>,
    },
    DisableTable {
        table_name: String,
        reply: oneshot::Sender<Result<(), MasterError>>,
    },
    ModifyTable {
        table_name: String,
        action: AdminAction,
        reply: oneshot::Sender<Result<(), MasterError>>,
    },
    AlterTable {
        table_name: String,
        edits: AlterSpec,
        reply: oneshot::Sender<Result<Vec<u64>, MasterError>>,
    },
    GetAlterStatus {
        table_name: String,
        reply: oneshot::Sender<Result<AlterStatusReply, MasterError>>,
    },
    GetClusterStatus {
        reply: oneshot::Sender<ClusterStatus>,
    },
    /// The region-server heartbeat. Its reply carries whatever directives
    /// the Assigner has queued for this server since its last `Report`, so
    /// — unlike `Startup` — it cannot be a fire-and-forget `OperationItem`;
    /// it runs through this oneshot-reply path like the admin calls above.
    RegionServerReport {
        server_name: String,
        load: ServerLoad,
        msgs: Vec<ReportMessage>,
        reply: oneshot::Sender<Vec<Directive>>,
    },
    Shutdown,
    StopMaster,
}

/// The admin-facing handle (`is_master_running`, `create_table`, ...).
/// Cloned into every client-facing connection task; all it does is push
/// onto the same queue `MasterLoop` drains.
#[derive(Clone)]
pub struct MasterHandle {
    calls: tokio::sync::mpsc::Sender<RpcCall>,
    running: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl MasterHandle {
    pub fn new(calls: tokio::sync::mpsc::Sender<RpcCall>, running: std::sync::Arc<std::sync::atomic::AtomicBool>) -> Self {
        Self { calls, running }
    }

    pub fn is_master_running(&self) -> bool {
        self.running.load(std::sync::atomic::Ordering::Acquire)
    }

    pub async fn create_table(
        &self,
        table_name: String,
        schema: TableSchema,
        split_keys: Vec<bytes::Bytes>,
    ) -> Result<(), MasterError> {
        let (reply, rx) = oneshot::channel();
        self.send(RpcCall::CreateTable {
            table_name,
            schema,
            split_keys,
            reply,
        })
        .await?;
        rx.await.map_err(|_| MasterError::MasterShuttingDown)?
    }

    pub async fn delete_table(&self, table_name: String) -> Result<(), MasterError> {
        let (reply, rx) = oneshot::channel();
        self.send(RpcCall::DeleteTable { table_name, reply }).await?;
        rx.await.map_err(|_| MasterError::MasterShuttingDown)?
    }

    pub async fn enable_table(&self, table_name: String) -> Result<(), MasterError> {
        let (reply, rx) = oneshot::channel();
        self.send(RpcCall::EnableTable { table_name, reply }).await?;
        rx.await.map_err(|_| MasterError::MasterShuttingDown)?
    }

    pub async fn disable_table(&self, table_name: String) -> Result<(), MasterError> {
        let (reply, rx) = oneshot::channel();
        self.send(RpcCall::DisableTable { table_name, reply }).await?;
        rx.await.map_err(|_| MasterError::MasterShuttingDown)?
    }

    pub async fn modify_table(&self, table_name: String, action: AdminAction) -> Result<(), MasterError> {
        let (reply, rx) = oneshot::channel();
        self.send(RpcCall::ModifyTable {
            table_name,
            action,
            reply,
        })
        .await?;
        rx.await.map_err(|_| MasterError::MasterShuttingDown)?
    }

    pub async fn alter_table(&self, table_name: String, edits: AlterSpec) -> Result<Vec<u64>, MasterError> {
        let (reply, rx) = oneshot::channel();
        self.send(RpcCall::AlterTable {
            table_name,
            edits,
            reply,
        })
        .await?;
        rx.await.map_err(|_| MasterError::MasterShuttingDown)?
    }

    pub async fn get_alter_status(&self, table_name: String) -> Result<AlterStatusReply, MasterError> {
        let (reply, rx) = oneshot::channel();
        self.send(RpcCall::GetAlterStatus { table_name, reply }).await?;
        rx.await.map_err(|_| MasterError::MasterShuttingDown)?
    }

    pub async fn get_cluster_status(&self) -> Result<ClusterStatus, MasterError> {
        let (reply, rx) = oneshot::channel();
        self.send(RpcCall::GetClusterStatus { reply }).await?;
        rx.await.map_err(|_| MasterError::MasterShuttingDown)
    }

    pub async fn shutdown(&self) -> Result<(), MasterError> {
        self.send(RpcCall::Shutdown).await
    }

    pub async fn stop_master(&self) -> Result<(), MasterError> {
        self.send(RpcCall::StopMaster).await
    }

    async fn send(&self, call: RpcCall) -> Result<(), MasterError> {
        if !self.is_master_running() {
            return Err(MasterError::MasterNotRunning);
        }
        self.calls
            .send(call)
            .await
            .map_err(|_| MasterError::MasterShuttingDown)
    }
}

/// The region-server-facing handle: `region_server_startup` enqueues onto
/// the `OperationQueue` (fire-and-forget; its reply needs nothing the loop
/// computed), while `region_server_report` goes over the `RpcCall` channel
/// so it can await the directives the Assigner queued for this server.
#[derive(Clone)]
pub struct RegionServerGateway {
    queue: OperationQueueHandle,
    calls: mpsc::Sender<RpcCall>,
    rootdir: String,
    fs_default_name: String,
}

impl RegionServerGateway {
    pub fn new(
        queue: OperationQueueHandle,
        calls: mpsc::Sender<RpcCall>,
        rootdir: String,
        fs_default_name: String,
    ) -> Self {
        Self {
            queue,
            calls,
            rootdir,
            fs_default_name,
        }
    }

    pub async fn region_server_startup(&self, server: ServerInfo) -> Result<StartupConfig, MasterError> {
        self.queue
            .enqueue(OperationItem::ProcessServerStartup { server })
            .await
            .map_err(|_| MasterError::MasterShuttingDown)?;
        Ok(StartupConfig {
            rootdir: self.rootdir.clone(),
            fs_default_name: self.fs_default_name.clone(),
        })
    }

    pub async fn region_server_report(
        &self,
        server_name: String,
        load: ServerLoad,
        msgs: Vec<ReportMessage>,
    ) -> Result<Vec<Directive>, MasterError> {
        let (reply, rx) = oneshot::channel();
        self.calls
            .send(RpcCall::RegionServerReport { server_name, load, msgs, reply })
            .await
            .map_err(|_| MasterError::MasterShuttingDown)?;
        rx.await.map_err(|_| MasterError::MasterShuttingDown)
    }
}
