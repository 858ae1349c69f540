// src/server/paths.rs

//! Coordination-store and persisted-file layout, generalized to a
//! configurable `root_znode` prefix rather than a hardcoded path.

use std::path::{Path, PathBuf};

/// Ephemeral node holding `host:port` of the currently active master.
pub fn master_lock(root_znode: &str) -> String {
    format!("{root_znode}/master")
}

/// Directory of ephemeral per-region-server nodes.
pub fn region_servers_dir(root_znode: &str) -> String {
    format!("{root_znode}/rs")
}

pub fn region_server_node(root_znode: &str, server_name: &str) -> String {
    format!("{}/{}", region_servers_dir(root_znode), server_name)
}

/// Value node: `host:port` of the region server currently holding the root
/// region.
pub fn root_region_server(root_znode: &str) -> String {
    format!("{root_znode}/root-region-server")
}

/// Presence signals a cluster-wide drain in progress.
pub fn shutdown_flag(root_znode: &str) -> String {
    format!("{root_znode}/shutdown")
}

/// Directory of transient markers for in-transition regions.
pub fn unassigned_dir(root_znode: &str) -> String {
    format!("{root_znode}/unassigned")
}

pub fn unassigned_region(root_znode: &str, region_id: u64) -> String {
    format!("{}/{}", unassigned_dir(root_znode), region_id)
}

/// `<rootdir>/hbase.version`-equivalent marker, checked on startup.
pub fn version_marker(rootdir: &Path) -> PathBuf {
    rootdir.join("tablemaster.version")
}

pub fn root_catalog_dir(rootdir: &Path) -> PathBuf {
    rootdir.join(crate::core::region::ROOT_TABLE_NAME)
}

pub fn meta_catalog_dir(rootdir: &Path) -> PathBuf {
    rootdir.join(crate::core::region::META_TABLE_NAME)
}

pub fn wal_dir(rootdir: &Path, server_name: &str) -> PathBuf {
    rootdir.join(".logs").join(server_name)
}

pub fn archived_logs_dir(rootdir: &Path) -> PathBuf {
    rootdir.join(".oldlogs")
}

/// Locality cache snapshot path.
pub fn locality_snapshot(tmp_dir: &Path) -> PathBuf {
    tmp_dir.join("regionLocality-snapshot")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_respect_the_configured_prefix() {
        assert_eq!(master_lock("/mycluster"), "/mycluster/master");
        assert_eq!(
            region_server_node("/mycluster", "rs1-1"),
            "/mycluster/rs/rs1-1"
        );
    }
}
