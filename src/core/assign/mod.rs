// src/core/assign/mod.rs

//! Picks target servers for unassigned regions using load and locality.
//!
//! Candidate selection filters to live servers, sorts by a ranking key, and
//! takes the first, generalized into a three-step root/locality/load-balance
//! algorithm with per-target backoff bookkeeping for lost directives.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::core::assignment::{AssignmentState, AssignmentTable};
use crate::core::errors::MasterError;
use crate::core::locality::LocalityOracle;
use crate::core::region::{Region, RegionKind};
use crate::core::registry::{Directive, ServerRegistry};

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Backoff {
    retry_count: u32,
    next_eligible_at: Instant,
}

impl Backoff {
    fn fresh() -> Self {
        Self {
            retry_count: 0,
            next_eligible_at: Instant::now(),
        }
    }

    /// Exponential, base 1s, factor 2, cap 60s (see DESIGN.md for why this
    /// scheme was chosen).
    fn record_lost_directive(&mut self) {
        self.retry_count += 1;
        let exp = self.retry_count.min(6); // 2^6 * 1s = 64s already exceeds the cap
        let delay = BACKOFF_BASE * 2u32.saturating_pow(exp.saturating_sub(1)).max(1);
        self.next_eligible_at = Instant::now() + delay.min(BACKOFF_CAP);
    }

    fn is_eligible(&self) -> bool {
        Instant::now() >= self.next_eligible_at
    }
}

/// Per-region retry bookkeeping, kept out of `AssignmentEntry` so
/// `AssignmentTable` stays a pure state machine.
pub struct Assigner {
    backoff: DashMap<u64, Backoff>,
}

impl Default for Assigner {
    fn default() -> Self {
        Self::new()
    }
}

impl Assigner {
    pub fn new() -> Self {
        Self {
            backoff: DashMap::new(),
        }
    }

    /// Called when an open-region directive for `region_id` is confirmed
    /// lost (no matching `Report` within `assignment_timeout`): reverts the
    /// region to `UNASSIGNED` and records the backoff.
    pub fn directive_lost(&self, table: &AssignmentTable, region_id: u64) {
        table.clear_in_transition(region_id);
        self.backoff
            .entry(region_id)
            .or_insert_with(Backoff::fresh)
            .record_lost_directive();
    }

    /// A region successfully opened; its backoff state is no longer needed.
    pub fn forget(&self, region_id: u64) {
        self.backoff.remove(&region_id);
    }

    /// Finds every `PENDING_OPEN` region whose directive has gone
    /// unconfirmed past `assignment_timeout` and reverts it via
    /// `directive_lost`. Called alongside the stale-server sweep so a lost
    /// directive does not wait for a future assignment cycle to be noticed.
    pub fn sweep_lost_directives(&self, table: &AssignmentTable, assignment_timeout: Duration) -> Vec<u64> {
        let stale = table.stale_pending_open(assignment_timeout);
        for region_id in &stale {
            self.directive_lost(table, *region_id);
        }
        stale
    }

    fn is_eligible(&self, region_id: u64) -> bool {
        self.backoff
            .get(&region_id)
            .map(|b| b.is_eligible())
            .unwrap_or(true)
    }

    /// One assignment cycle: consumes `table.unassigned()`, emits
    /// `PENDING_OPEN` transitions for the ones it can place, and queues the
    /// corresponding open-region directive on the chosen server. Returns
    /// the region ids it placed this cycle.
    pub fn run_cycle(
        &self,
        table: &AssignmentTable,
        registry: &ServerRegistry,
        oracle: &LocalityOracle,
        master_started_at: Instant,
        apply_preferred_period: Duration,
        hold_for_locality_period: Duration,
    ) -> Result<Vec<u64>, MasterError> {
        let live = registry.live_servers();
        if live.is_empty() {
            return Err(MasterError::InsufficientServers);
        }

        let mut placed = Vec::new();
        for entry in table.unassigned() {
            let region_id = entry.region.region_id;
            if !self.is_eligible(region_id) {
                continue;
            }

            let chosen = if matches!(entry.region.kind(), RegionKind::Root | RegionKind::Meta) {
                Self::pick_min_load(registry, &entry.region)
            } else if master_started_at.elapsed() <= apply_preferred_period {
                self.pick_with_locality(registry, oracle, &entry.region, entry.since, hold_for_locality_period)?
            } else {
                Self::pick_min_load(registry, &entry.region)
            };

            let Some(server_name) = chosen else {
                continue;
            };

            table.set_state(region_id, AssignmentState::PendingOpen, Some(server_name.clone()))?;
            registry.queue_directive(&server_name, Directive::OpenRegion { region_id });
            placed.push(region_id);
        }
        Ok(placed)
    }

    fn pick_with_locality(
        &self,
        registry: &ServerRegistry,
        oracle: &LocalityOracle,
        region: &Region,
        unassigned_since: Instant,
        hold_for_locality_period: Duration,
    ) -> Result<Option<String>, MasterError> {
        if let Some(preferred) = oracle.preferred_for(region.region_id) {
            if let Some(live) = preferred.ordered_servers.iter().find(|name| registry.is_live(name)) {
                return Ok(Some(live.clone()));
            }
            if unassigned_since.elapsed() <= hold_for_locality_period {
                // Still inside the grace window: skip this cycle rather
                // than place it elsewhere.
                return Ok(None);
            }
        }
        Ok(Self::pick_min_load(registry, region))
    }

    /// Live server with the minimum load, ties broken by `server_name`.
    fn pick_min_load(registry: &ServerRegistry, _region: &Region) -> Option<String> {
        registry
            .light_servers(u32::MAX)
            .into_iter()
            .next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::server_info::ServerInfo;
    use bytes::Bytes;

    fn region(id: u64) -> Region {
        Region::new("t", Bytes::new(), Bytes::new(), id)
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let mut backoff = Backoff::fresh();
        for _ in 0..10 {
            backoff.record_lost_directive();
        }
        let delay = backoff.next_eligible_at.saturating_duration_since(Instant::now());
        assert!(delay <= BACKOFF_CAP);
    }

    #[tokio::test]
    async fn run_cycle_fails_with_insufficient_servers_when_none_are_live() {
        let table = AssignmentTable::new();
        table.insert_new(region(1));
        let registry = ServerRegistry::new();
        let oracle = LocalityOracle::new(
            std::env::temp_dir().join("nonexistent-locality.json"),
            Duration::from_secs(3600),
            1,
        );
        let assigner = Assigner::new();
        let err = assigner
            .run_cycle(
                &table,
                &registry,
                &oracle,
                Instant::now(),
                Duration::from_secs(300),
                Duration::from_secs(60),
            )
            .unwrap_err();
        assert!(matches!(err, MasterError::InsufficientServers));
    }

    #[test]
    fn sweep_lost_directives_reverts_stale_pending_open_entries() {
        let table = AssignmentTable::new();
        table.insert_new(region(1));
        table
            .set_state(1, AssignmentState::PendingOpen, Some("rs1".into()))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));

        let assigner = Assigner::new();
        let reverted = assigner.sweep_lost_directives(&table, Duration::from_millis(1));
        assert_eq!(reverted, vec![1]);
        assert_eq!(table.get(1).unwrap().state, AssignmentState::Unassigned);
        assert!(!assigner.is_eligible(1));
    }

    #[tokio::test]
    async fn run_cycle_places_root_on_the_lightest_live_server() {
        let table = AssignmentTable::new();
        table.insert_new(Region::new(
            crate::core::region::ROOT_TABLE_NAME,
            Bytes::new(),
            Bytes::new(),
            0,
        ));
        let registry = ServerRegistry::new();
        registry.record_startup(ServerInfo::new("127.0.0.1:9000".parse().unwrap(), 1), false);
        let oracle = LocalityOracle::new(
            std::env::temp_dir().join("nonexistent-locality-2.json"),
            Duration::from_secs(3600),
            1,
        );
        let assigner = Assigner::new();
        let placed = assigner
            .run_cycle(
                &table,
                &registry,
                &oracle,
                Instant::now(),
                Duration::from_secs(300),
                Duration::from_secs(60),
            )
            .unwrap();
        assert_eq!(placed, vec![0]);
        assert_eq!(table.get(0).unwrap().state, AssignmentState::PendingOpen);
    }
}
