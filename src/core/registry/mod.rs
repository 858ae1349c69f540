// src/core/registry/mod.rs

//! Tracks live/dead region servers, their loads, and last heartbeat.
//!
//! A `DashMap` of peers plus a `down_since` marker, with a "mark down
//! once, don't re-warn" discipline for transitioning a server to dead.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::core::server_info::{ServerInfo, ServerLoad};

/// A directive piggybacked on the reply to a region server's next `Report`
/// the Assigner does not push to servers, it only ever responds to
/// their next heartbeat.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    OpenRegion { region_id: u64 },
    CloseRegion { region_id: u64 },
    SplitRegion { region_id: u64 },
    Flush { region_id: u64 },
}

#[derive(Debug, Clone)]
struct RegisteredServer {
    info: ServerInfo,
    last_report: Instant,
    dead: bool,
    pending_directives: Vec<Directive>,
}

/// Tracks every region server the master currently believes is part of the
/// cluster, indexed by `server_name`.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    by_name: DashMap<String, RegisteredServer>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles a `Startup` RPC. If a prior entry exists under the same
    /// address with a *different* `start_code`, it is a reincarnation: the
    /// old entry is marked dead (its log directory is the caller's
    /// responsibility to queue for splitting — see `logsplit`) before the
    /// new one replaces it.
    ///
    /// Returns the server_name of the superseded entry, if any, so the
    /// caller can enqueue `ProcessServerDeath` for it.
    pub fn record_startup(&self, info: ServerInfo, _is_failover_recovery: bool) -> Option<String> {
        let new_name = info.server_name();
        let mut superseded = None;
        for entry in self.by_name.iter() {
            if entry.info.addr == info.addr && entry.info.start_code != info.start_code && !entry.dead {
                superseded = Some(entry.key().clone());
            }
        }
        if let Some(old_name) = &superseded {
            if let Some(mut old) = self.by_name.get_mut(old_name) {
                old.dead = true;
            }
        }
        self.by_name.insert(
            new_name,
            RegisteredServer {
                info,
                last_report: Instant::now(),
                dead: false,
                pending_directives: Vec::new(),
            },
        );
        superseded
    }

    /// Handles a `Report` RPC: updates load, advances the last-seen
    /// timestamp, and drains any directives queued for this server
    pub fn record_report(&self, server_name: &str, load: ServerLoad) -> Vec<Directive> {
        if let Some(mut entry) = self.by_name.get_mut(server_name) {
            entry.info.load = load;
            entry.last_report = Instant::now();
            std::mem::take(&mut entry.pending_directives)
        } else {
            Vec::new()
        }
    }

    /// Queues a directive to be delivered on `server_name`'s next `Report`
    /// reply. Called by the Assigner, never pushed out-of-band.
    pub fn queue_directive(&self, server_name: &str, directive: Directive) {
        if let Some(mut entry) = self.by_name.get_mut(server_name) {
            entry.pending_directives.push(directive);
        }
    }

    /// Any server whose session disappeared or whose last `Report` is
    /// older than `lease_timeout` transitions to dead. Returns the
    /// `server_name`s newly marked dead in this call (idempotent: a server
    /// already marked dead is not returned again).
    pub fn expire_stale(&self, lease_timeout: Duration) -> Vec<String> {
        let mut newly_dead = Vec::new();
        for mut entry in self.by_name.iter_mut() {
            if !entry.dead && entry.last_report.elapsed() > lease_timeout {
                entry.dead = true;
                newly_dead.push(entry.key().clone());
            }
        }
        newly_dead
    }

    /// Marks `server_name` dead immediately (coordination session loss),
    /// returning `true` if this call is the one that transitioned it.
    pub fn mark_dead(&self, server_name: &str) -> bool {
        if let Some(mut entry) = self.by_name.get_mut(server_name) {
            if !entry.dead {
                entry.dead = true;
                return true;
            }
        }
        false
    }

    /// Removes a server's entry entirely. Called once log-split recovery
    /// has completed for it.
    pub fn remove(&self, server_name: &str) {
        self.by_name.remove(server_name);
    }

    pub fn is_live(&self, server_name: &str) -> bool {
        self.by_name
            .get(server_name)
            .map(|e| !e.dead)
            .unwrap_or(false)
    }

    pub fn load_of(&self, server_name: &str) -> Option<ServerLoad> {
        self.by_name.get(server_name).map(|e| e.info.load)
    }

    /// Every currently-live server, as `(server_name, load)` pairs.
    pub fn live_servers(&self) -> BTreeMap<String, ServerLoad> {
        self.by_name
            .iter()
            .filter(|e| !e.dead)
            .map(|e| (e.key().clone(), e.info.load))
            .collect()
    }

    /// Servers marked dead but not yet removed: death has been observed
    /// (session loss or a missed lease) but log-split recovery has not yet
    /// completed for them, per the lifecycle in `get_cluster_status`'s
    /// `dead_servers` field.
    pub fn dead_servers(&self) -> Vec<String> {
        self.by_name
            .iter()
            .filter(|e| e.dead)
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn average_load(&self) -> f64 {
        let live: Vec<u32> = self
            .by_name
            .iter()
            .filter(|e| !e.dead)
            .map(|e| e.info.load.region_count)
            .collect();
        if live.is_empty() {
            return 0.0;
        }
        live.iter().sum::<u32>() as f64 / live.len() as f64
    }

    /// Live servers whose region count is at or below `threshold`, ordered
    /// lightest-first. Returns an empty vector (never divides by zero) when
    /// the registry has no live servers.
    pub fn light_servers(&self, threshold: u32) -> Vec<String> {
        let mut candidates: Vec<(String, ServerLoad)> = self
            .by_name
            .iter()
            .filter(|e| !e.dead && e.info.load.region_count <= threshold)
            .map(|e| (e.key().clone(), e.info.load))
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        candidates.into_iter().map(|(name, _)| name).collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
