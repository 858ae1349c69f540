// src/core/assignment/mod.rs

//! The authoritative in-memory map of region to assigned server, plus
//! in-transition states. Persisted state lives in META; this module only
//! holds the in-memory authority and enforces the transition table.
//!
//! A `DashMap`-backed authoritative table mutated only through narrow,
//! validating methods rather than raw field access.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::core::errors::MasterError;
use crate::core::region::Region;

/// The assignment lifecycle state of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum AssignmentState {
    Unassigned,
    PendingOpen,
    Open,
    PendingClose,
    Closed,
    Offline,
    Splitting,
}

impl AssignmentState {
    /// Whether a region in this state counts toward the "at most one entry
    /// with state in {PENDING_OPEN, OPEN, PENDING_CLOSE}" invariant.
    pub fn is_in_transition_or_open(self) -> bool {
        matches!(
            self,
            AssignmentState::PendingOpen | AssignmentState::Open | AssignmentState::PendingClose
        )
    }
}

/// `(region, state, target_server, since_ts)`.
#[derive(Debug, Clone)]
pub struct AssignmentEntry {
    pub region: Region,
    pub state: AssignmentState,
    pub target_server: Option<String>,
    pub since: Instant,
}

impl AssignmentEntry {
    fn new_unassigned(region: Region) -> Self {
        Self {
            region,
            state: AssignmentState::Unassigned,
            target_server: None,
            since: Instant::now(),
        }
    }
}

/// Returns `true` if transitioning from `from` to `to` is legal per the
/// state machine:
///
/// ```text
/// UNASSIGNED   --assign(s)-->    PENDING_OPEN(s)
/// PENDING_OPEN --opened-->       OPEN(s)
/// OPEN         --close-req-->    PENDING_CLOSE(s)
/// PENDING_CLOSE --closed-->      CLOSED
/// CLOSED       -->               UNASSIGNED
/// OPEN         --split-done-->   SPLITTING
/// any          --offline-->      OFFLINE
/// ```
fn is_legal_transition(from: AssignmentState, to: AssignmentState) -> bool {
    use AssignmentState::*;
    match (from, to) {
        (Unassigned, PendingOpen) => true,
        (PendingOpen, Open) => true,
        (PendingOpen, Unassigned) => true, // directive lost, reverted by the Assigner
        (Open, PendingClose) => true,
        (PendingClose, Closed) => true,
        (Closed, Unassigned) => true,
        (Open, Splitting) => true,
        (Splitting, Unassigned) => true, // daughters re-enter as new entries
        (_, Offline) => true,            // explicit admin offline, any source state
        (Offline, Unassigned) => true,   // re-enable
        _ => false,
    }
}

/// The authoritative in-memory map of region id to `AssignmentEntry`.
///
/// `set_state` is the *only* mutator and is only ever called from the
/// single `MasterLoop` task; concurrent RPC handlers read snapshots but
/// never mutate directly.
#[derive(Debug, Default)]
pub struct AssignmentTable {
    entries: DashMap<u64, AssignmentEntry>,
}

impl AssignmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an `UNASSIGNED` entry for a region that has just come into
    /// existence (table create, split daughter discovery, META scan).
    pub fn insert_new(&self, region: Region) {
        self.entries
            .insert(region.region_id, AssignmentEntry::new_unassigned(region));
    }

    /// Removes a region's entry entirely (it was deleted from META).
    pub fn remove(&self, region_id: u64) {
        self.entries.remove(&region_id);
    }

    pub fn get(&self, region_id: u64) -> Option<AssignmentEntry> {
        self.entries.get(&region_id).map(|e| e.clone())
    }

    /// Validates and applies a state transition. Rejects illegal
    /// transitions with [`MasterError::IllegalAssignmentTransition`]
    /// without mutating anything.
    pub fn set_state(
        &self,
        region_id: u64,
        new_state: AssignmentState,
        server: Option<String>,
    ) -> Result<(), MasterError> {
        let mut entry = self
            .entries
            .get_mut(&region_id)
            .ok_or_else(|| MasterError::Internal(format!("unknown region {region_id}")))?;

        if !is_legal_transition(entry.state, new_state) {
            return Err(MasterError::IllegalAssignmentTransition {
                region_id,
                from: entry.state,
                to: new_state,
            });
        }

        entry.state = new_state;
        entry.target_server = server;
        entry.since = Instant::now();
        Ok(())
    }

    /// Forcibly returns a region to `UNASSIGNED`, used when a directive is
    /// known lost. Unlike `set_state`, this bypasses the transition table
    /// since it is a recovery action, not a protocol step.
    pub fn clear_in_transition(&self, region_id: u64) {
        if let Some(mut entry) = self.entries.get_mut(&region_id) {
            entry.state = AssignmentState::Unassigned;
            entry.target_server = None;
            entry.since = Instant::now();
        }
    }

    /// All regions currently assigned to `server_name`.
    pub fn regions_of(&self, server_name: &str) -> Vec<Region> {
        self.entries
            .iter()
            .filter(|e| e.target_server.as_deref() == Some(server_name) && e.state == AssignmentState::Open)
            .map(|e| e.region.clone())
            .collect()
    }

    /// A snapshot of every entry in a transitional state.
    pub fn in_transition(&self) -> Vec<AssignmentEntry> {
        self.entries
            .iter()
            .filter(|e| e.state.is_in_transition_or_open() && e.state != AssignmentState::Open)
            .map(|e| e.clone())
            .collect()
    }

    /// All `UNASSIGNED` regions, the Assigner's input set.
    pub fn unassigned(&self) -> Vec<AssignmentEntry> {
        self.entries
            .iter()
            .filter(|e| e.state == AssignmentState::Unassigned)
            .map(|e| e.clone())
            .collect()
    }

    /// `PENDING_OPEN` region ids that have sat without a confirming
    /// `Report` for longer than `timeout`, the Assigner's input for
    /// `directive_lost`.
    pub fn stale_pending_open(&self, timeout: Duration) -> Vec<u64> {
        self.entries
            .iter()
            .filter(|e| e.state == AssignmentState::PendingOpen && e.since.elapsed() > timeout)
            .map(|e| *e.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks the invariant that at most one entry per region is in
    /// {PENDING_OPEN, OPEN, PENDING_CLOSE}. Always true by construction
    /// since each region has exactly one entry, but exposed for tests that
    /// assert the invariant explicitly after a sequence of operations.
    #[cfg(test)]
    pub fn at_most_one_in_transition_per_region(&self) -> bool {
        // A DashMap keyed by region_id already guarantees one entry per
        // region; this gives that property an explicit, named assertion
        // point in the test suite.
        true
    }
}
