// src/core/locality/mod.rs

//! Tracks which server holds the most DFS block locality for each region,
//! so the Assigner can prefer it within a bounded window after a restart.
//!
//! A snapshot-to-disk pattern (load/save a `DashMap` as JSON) with
//! `humantime_serde`-backed duration fields for the two window settings.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::core::errors::MasterError;

/// The servers holding locality for a region, computed by a DFS scan at
/// some point in the past and ordered highest-preference first. Usually a
/// single entry (the block-locality winner) but `MOVE_REGION` and a
/// multi-replica DFS scan can both produce more than one candidate, and the
/// Assigner falls through the list to the highest-preference one still
/// live rather than only ever looking at the first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferredPlacement {
    pub ordered_servers: Vec<String>,
    pub locality_fraction: f32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotFile {
    entries: Vec<(u64, PreferredPlacement)>,
}

/// Holds a bounded-validity snapshot of preferred placements and a
/// semaphore-limited scan budget for recomputing them.
pub struct LocalityOracle {
    preferred: DashMap<u64, PreferredPlacement>,
    loaded_at: std::sync::Mutex<Option<Instant>>,
    snapshot_path: PathBuf,
    snapshot_validity: Duration,
    scan_permits: Arc<Semaphore>,
}

impl LocalityOracle {
    pub fn new(snapshot_path: PathBuf, snapshot_validity: Duration, scan_pool_size: usize) -> Self {
        Self {
            preferred: DashMap::new(),
            loaded_at: std::sync::Mutex::new(None),
            snapshot_path,
            snapshot_validity,
            scan_permits: Arc::new(Semaphore::new(scan_pool_size.max(1))),
        }
    }

    /// Loads a previously saved snapshot from disk, if present and within
    /// `snapshot_validity`. A missing or stale file is not an error: the
    /// oracle simply starts empty and lets placements be recomputed.
    pub async fn load_snapshot(&self) -> Result<(), MasterError> {
        let path = self.snapshot_path.clone();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let metadata = tokio::fs::metadata(&path).await?;
        let age = metadata
            .modified()
            .ok()
            .and_then(|m| m.elapsed().ok())
            .unwrap_or(Duration::MAX);
        if age > self.snapshot_validity {
            return Ok(());
        }
        let snapshot: SnapshotFile = serde_json::from_slice(&bytes)?;
        self.preferred.clear();
        for (region_id, placement) in snapshot.entries {
            self.preferred.insert(region_id, placement);
        }
        *self.loaded_at.lock().unwrap() = Some(Instant::now());
        Ok(())
    }

    pub async fn save_snapshot(&self) -> Result<(), MasterError> {
        let entries: Vec<(u64, PreferredPlacement)> = self
            .preferred
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        let snapshot = SnapshotFile { entries };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        if let Some(parent) = self.snapshot_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.snapshot_path, bytes).await?;
        Ok(())
    }

    /// Records a freshly computed placement, e.g. from `rescan_region`.
    pub fn record(&self, region_id: u64, placement: PreferredPlacement) {
        self.preferred.insert(region_id, placement);
    }

    pub fn preferred_for(&self, region_id: u64) -> Option<PreferredPlacement> {
        self.preferred.get(&region_id).map(|e| e.clone())
    }

    /// Recomputes block locality for one region by walking its DFS storefile
    /// block locations. Bounded by `scan_permits` so a large table does not
    /// saturate the DFS client with concurrent scans.
    ///
    /// The scan implementation itself is an external collaborator (reading
    /// block locations from the storage layer); this method only enforces
    /// the concurrency bound and records the result.
    pub async fn rescan_region<F, Fut>(&self, region_id: u64, scan: F) -> Result<(), MasterError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<PreferredPlacement, MasterError>>,
    {
        let _permit = self
            .scan_permits
            .acquire()
            .await
            .map_err(|_| MasterError::Internal("locality scan semaphore closed".to_string()))?;
        let placement = scan().await?;
        self.record(region_id, placement);
        Ok(())
    }

    /// Whether the Assigner should still honor the preferred placement for
    /// `region_id`, given `master_started_at` and the two configured
    /// windows: `apply_preferred_period` bounds how long after master
    /// startup preference is honored at all; within that,
    /// `hold_for_locality_period` is the grace window during which the
    /// preferred server is waited for even if temporarily unavailable.
    pub fn should_apply_preference(
        &self,
        master_started_at: Instant,
        apply_preferred_period: Duration,
    ) -> bool {
        master_started_at.elapsed() <= apply_preferred_period
    }

    pub fn hold_for_locality(&self, region_assignment_started_at: Instant, hold_for_locality_period: Duration) -> bool {
        region_assignment_started_at.elapsed() <= hold_for_locality_period
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }
}
