// src/server/election.rs

//! Leader election over ephemeral nodes: exactly one contender wins the
//! master lock; losers watch it and retry once it vanishes. A
//! `backup`-flagged contender additionally stalls before its first attempt
//! so a healthy primary is not preempted on cold boot.

use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::core::coord::{CoordClient, CoordEvent};
use crate::core::errors::MasterError;
use crate::server::paths;

/// Blocks until this process wins the master lock at `root_znode`/master,
/// stalling `2 * session_timeout` first if `backup` is set.
pub async fn run(
    coord: &Arc<dyn CoordClient>,
    root_znode: &str,
    own_addr: &str,
    backup: bool,
    session_timeout: Duration,
) -> Result<(), MasterError> {
    if backup {
        info!(stall = ?(session_timeout * 2), "backup master stalling before first election attempt");
        tokio::time::sleep(session_timeout * 2).await;
    }

    let lock_path = paths::master_lock(root_znode);
    loop {
        match coord
            .create_ephemeral(&lock_path, Bytes::from(own_addr.to_string()))
            .await
        {
            Ok(()) => {
                info!(addr = own_addr, "won master election");
                return Ok(());
            }
            Err(_) => {
                wait_for_vacancy(coord, &lock_path).await?;
            }
        }
    }
}

/// Watches `lock_path` until its holder's ephemeral node is deleted.
async fn wait_for_vacancy(coord: &Arc<dyn CoordClient>, lock_path: &str) -> Result<(), MasterError> {
    let mut events = coord.watch(lock_path).await?;
    while let Some(event) = events.next().await {
        match event {
            CoordEvent::Deleted { .. } | CoordEvent::SessionExpired => return Ok(()),
            _ => continue,
        }
    }
    Ok(())
}

/// A master is cluster-starter iff, at the moment it won the election, the
/// region-server directory was empty: this distinguishes
/// fresh-cluster bootstrap from failover reconstruction.
pub async fn is_cluster_starter(coord: &Arc<dyn CoordClient>, root_znode: &str) -> Result<bool, MasterError> {
    let children = coord.list(&paths::region_servers_dir(root_znode)).await?;
    Ok(children.is_empty())
}
