// src/server/bootstrap.rs

//! Fresh-cluster bootstrap vs. failover reconstruction: creating the root
//! and META catalog regions on a cluster starter, or rebuilding
//! `AssignmentTable` from the servers a failover master finds already
//! running, without re-assigning anything. Loads authoritative state from
//! what is already on disk/in the cluster rather than recomputing it.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

use crate::core::assignment::{AssignmentState, AssignmentTable};
use crate::core::coord::CoordClient;
use crate::core::errors::MasterError;
use crate::core::region::{self, Region, TableSchema};
use crate::core::server_info::ServerInfo;
use crate::server::paths;

pub const ROOT_REGION_ID: u64 = 0;
pub const META_REGION_ID: u64 = 1;
/// First region id available to user tables once root (0) and META (1)
/// have claimed theirs.
pub const FIRST_USER_REGION_ID: u64 = 2;

const LAYOUT_VERSION: &str = "1";

/// The external collaborator a failover master calls to learn what regions
/// a still-running region server is currently hosting during failover
/// reconstruction. The query protocol itself is out of scope for this
/// crate (RPC transport); this trait only names the contract.
#[async_trait]
pub trait RegionServerClient: Send + Sync {
    async fn report_regions(&self, server: &ServerInfo) -> Result<Vec<Region>, MasterError>;
}

/// Checks `<rootdir>/tablemaster.version` against [`LAYOUT_VERSION`],
/// writing it on first run. Fails with
/// [`MasterError::IncompatibleVersion`] on a mismatch.
pub async fn check_or_write_version_marker(rootdir: &Path) -> Result<(), MasterError> {
    let marker = paths::version_marker(rootdir);
    match tokio::fs::read_to_string(&marker).await {
        Ok(found) => {
            let found = found.trim();
            if found != LAYOUT_VERSION {
                return Err(MasterError::IncompatibleVersion {
                    expected: LAYOUT_VERSION.to_string(),
                    found: found.to_string(),
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = marker.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&marker, LAYOUT_VERSION).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn root_schema() -> Arc<TableSchema> {
    Arc::new(TableSchema::new(region::ROOT_TABLE_NAME, vec!["info".to_string()]))
}

fn meta_schema() -> Arc<TableSchema> {
    Arc::new(TableSchema::new(region::META_TABLE_NAME, vec!["info".to_string()]))
}

/// Creates the singleton root region and the first META region on a fresh
/// cluster: the root region must exist before META, so they are created
/// in that order and the invariant holds even momentarily. Returns the
/// next free region id for user tables.
pub fn bootstrap_fresh_cluster(assignment: &AssignmentTable) -> u64 {
    assignment.insert_new(
        Region::new(region::ROOT_TABLE_NAME, Bytes::new(), Bytes::new(), ROOT_REGION_ID)
            .with_schema(root_schema()),
    );
    assignment.insert_new(
        Region::new(region::META_TABLE_NAME, Bytes::new(), Bytes::new(), META_REGION_ID)
            .with_schema(meta_schema()),
    );
    FIRST_USER_REGION_ID
}

/// Rebuilds `AssignmentTable` from the region servers a failover master
/// finds already registered, marking each reported region `OPEN` on the
/// server that reported it rather than re-assigning anything.
///
/// `rs_client` is the external collaborator used to ask each live server
/// what it is currently hosting. When `None` (no production client wired
/// up), reconstruction is skipped and a warning is logged: the master
/// starts with an empty `AssignmentTable` and relies on the next `Report`
/// from each region server to repopulate it, which is safe but slower than
/// a true failover.
pub async fn reconstruct_via_failover(
    coord: &Arc<dyn CoordClient>,
    root_znode: &str,
    assignment: &AssignmentTable,
    rs_client: Option<&dyn RegionServerClient>,
) -> Result<u64, MasterError> {
    let server_names = coord.list(&paths::region_servers_dir(root_znode)).await?;
    let mut max_region_id = FIRST_USER_REGION_ID - 1;

    let Some(rs_client) = rs_client else {
        tracing::warn!(
            servers = server_names.len(),
            "failover reconstruction has no RegionServerClient configured; starting with an empty \
             assignment table and relying on each server's next Report to repopulate it"
        );
        return Ok(FIRST_USER_REGION_ID);
    };

    for server_name in &server_names {
        let Some((addr, start_code)) = ServerInfo::parse_server_name(server_name) else {
            tracing::warn!(server_name, "skipping unparsable server name during failover reconstruction");
            continue;
        };
        let info = ServerInfo::new(addr, start_code);
        let regions = rs_client.report_regions(&info).await?;
        for region in regions {
            max_region_id = max_region_id.max(region.region_id);
            let region_id = region.region_id;
            assignment.insert_new(region);
            assignment.set_state(region_id, AssignmentState::PendingOpen, Some(server_name.clone()))?;
            assignment.set_state(region_id, AssignmentState::Open, Some(server_name.clone()))?;
        }
    }
    Ok(max_region_id + 1)
}
