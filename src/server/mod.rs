// src/server/mod.rs

//! The master process: leader election, startup/bootstrap, and the
//! single-threaded control loop that owns all mutable cluster state.

use anyhow::Result;

pub mod bootstrap;
pub mod election;
mod initialization;
pub mod master_loop;
pub mod paths;
pub mod rpc;

pub use initialization::ServerContext;
pub use master_loop::{MasterCore, RunState};
pub use rpc::{AlterStatusReply, ClusterStatus, MasterHandle, RegionServerGateway, RpcCall, StartupConfig};

use crate::config::Config;

/// Runs the master end to end: wins leader election, bootstraps or
/// reconstructs cluster state, then drives the control loop until it
/// reaches [`RunState::Closed`].
pub async fn run(config: Config) -> Result<()> {
    let ServerContext {
        mut master,
        queue,
        rpc_rx,
        handle,
        rs_gateway,
    } = initialization::setup(config).await?;
    let _ = (handle, rs_gateway);
    master.run(queue, rpc_rx).await;
    Ok(())
}

/// Like [`run`], but returns the [`MasterHandle`] and [`RegionServerGateway`]
/// before the control loop starts, for callers that need to issue admin
/// RPCs (or a ctrl-c shutdown) and region-server RPCs against the running
/// master.
pub async fn run_with_handle(
    config: Config,
) -> Result<(MasterHandle, RegionServerGateway, tokio::task::JoinHandle<()>)> {
    let ServerContext {
        mut master,
        queue,
        rpc_rx,
        handle,
        rs_gateway,
    } = initialization::setup(config).await?;
    let returned_handle = handle.clone();
    let returned_gateway = rs_gateway.clone();
    let join = tokio::spawn(async move {
        master.run(queue, rpc_rx).await;
    });
    Ok((returned_handle, returned_gateway, join))
}
