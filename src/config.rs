// src/config.rs

//! Manages master configuration: loading, resolving dynamic values, and
//! validation, in a raw-then-validated two-stage shape (`RawConfig`
//! deserializes with defaults; `Config::from_file` resolves and validates
//! it into the type the rest of the crate uses).

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// The fully resolved and validated master configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base directory on the DFS under which catalog regions, WAL
    /// directories, and the version marker live.
    pub rootdir: String,
    /// Prefix under which every coordination-store path this master uses
    /// is rooted (an operational knob rather than a hardcoded prefix).
    pub root_znode: String,
    /// Whether this process starts in backup (standby) mode, stalling
    /// `2 * session_timeout` before its first election attempt.
    pub backup: bool,
    /// The minimum number of region servers required before `create_table`
    /// stops retrying and fails with `InsufficientServers`.
    pub min_servers: u32,

    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub thread_wake_frequency: Duration,
    #[serde(with = "humantime_serde")]
    pub rs_lease_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub assignment_timeout: Duration,

    /// How long after master startup a `LocalityOracle` preference is
    /// honored at all.
    #[serde(with = "humantime_serde")]
    pub apply_preferred_period: Duration,
    /// Grace window during which an unassigned region waits for its
    /// preferred server before being placed elsewhere.
    #[serde(with = "humantime_serde")]
    pub hold_for_locality_period: Duration,
    /// How long a cached locality snapshot remains trustworthy before a
    /// rescan is triggered.
    #[serde(with = "humantime_serde")]
    pub snapshot_validity: Duration,
    /// Number of DFS block-locality scans the `LocalityOracle` runs
    /// concurrently.
    pub locality_scan_pool_size: usize,

    /// Number of attempts `TableOps::create_table` retries a `NotReady`
    /// condition before giving up.
    pub num_retries: u32,
    /// Sleep between `create_table` retry attempts.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
    /// At most this many regions of a table are in transition
    /// simultaneously during `alter_table`.
    pub max_concurrent_reopens: usize,

    /// Bounded capacity of the `OperationQueue`.
    pub queue_capacity: usize,
    /// Number of times an item is requeued before becoming `FAILED`.
    pub max_attempts: u32,

    pub log_level: String,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    8878
}

/// A raw representation of the config file before validation and resolution.
#[derive(Deserialize)]
struct RawConfig {
    rootdir: String,
    #[serde(default = "default_root_znode")]
    root_znode: String,
    #[serde(default)]
    backup: bool,
    #[serde(default = "default_min_servers")]
    min_servers: u32,

    #[serde(default = "default_session_timeout", with = "humantime_serde")]
    session_timeout: Duration,
    #[serde(default = "default_thread_wake_frequency", with = "humantime_serde")]
    thread_wake_frequency: Duration,
    #[serde(default = "default_rs_lease_timeout", with = "humantime_serde")]
    rs_lease_timeout: Duration,
    #[serde(default = "default_assignment_timeout", with = "humantime_serde")]
    assignment_timeout: Duration,

    #[serde(default = "default_apply_preferred_period", with = "humantime_serde")]
    apply_preferred_period: Duration,
    #[serde(default = "default_hold_for_locality_period", with = "humantime_serde")]
    hold_for_locality_period: Duration,
    #[serde(default = "default_snapshot_validity", with = "humantime_serde")]
    snapshot_validity: Duration,
    #[serde(default = "default_locality_scan_pool_size")]
    locality_scan_pool_size: usize,

    #[serde(default = "default_num_retries")]
    num_retries: u32,
    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    retry_backoff: Duration,
    #[serde(default = "default_max_concurrent_reopens")]
    max_concurrent_reopens: usize,

    #[serde(default = "default_queue_capacity")]
    queue_capacity: usize,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,

    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_root_znode() -> String {
    "/tablemaster".to_string()
}
fn default_min_servers() -> u32 {
    1
}
fn default_session_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_thread_wake_frequency() -> Duration {
    Duration::from_secs(10)
}
fn default_rs_lease_timeout() -> Duration {
    Duration::from_secs(90)
}
fn default_assignment_timeout() -> Duration {
    Duration::from_secs(180)
}
fn default_apply_preferred_period() -> Duration {
    Duration::from_secs(5 * 60)
}
fn default_hold_for_locality_period() -> Duration {
    Duration::from_secs(60)
}
fn default_snapshot_validity() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}
fn default_locality_scan_pool_size() -> usize {
    5
}
fn default_num_retries() -> u32 {
    2
}
fn default_retry_backoff() -> Duration {
    Duration::from_secs(1)
}
fn default_max_concurrent_reopens() -> usize {
    8
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_max_attempts() -> u32 {
    3
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let raw: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;

        let config = Config {
            rootdir: raw.rootdir,
            root_znode: raw.root_znode,
            backup: raw.backup,
            min_servers: raw.min_servers,
            session_timeout: raw.session_timeout,
            thread_wake_frequency: raw.thread_wake_frequency,
            rs_lease_timeout: raw.rs_lease_timeout,
            assignment_timeout: raw.assignment_timeout,
            apply_preferred_period: raw.apply_preferred_period,
            hold_for_locality_period: raw.hold_for_locality_period,
            snapshot_validity: raw.snapshot_validity,
            locality_scan_pool_size: raw.locality_scan_pool_size,
            num_retries: raw.num_retries,
            retry_backoff: raw.retry_backoff,
            max_concurrent_reopens: raw.max_concurrent_reopens,
            queue_capacity: raw.queue_capacity,
            max_attempts: raw.max_attempts,
            log_level: raw.log_level,
            metrics: raw.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    fn validate(&self) -> Result<()> {
        if self.rootdir.trim().is_empty() {
            return Err(anyhow!("rootdir cannot be empty"));
        }
        if self.root_znode.trim().is_empty() || !self.root_znode.starts_with('/') {
            return Err(anyhow!("root_znode must be a non-empty absolute path"));
        }
        if self.min_servers == 0 {
            return Err(anyhow!("min_servers cannot be 0"));
        }
        if self.queue_capacity == 0 {
            return Err(anyhow!("queue_capacity cannot be 0"));
        }
        if self.locality_scan_pool_size == 0 {
            return Err(anyhow!("locality_scan_pool_size cannot be 0"));
        }
        if self.max_concurrent_reopens == 0 {
            return Err(anyhow!("max_concurrent_reopens cannot be 0"));
        }
        if self.hold_for_locality_period > self.apply_preferred_period {
            return Err(anyhow!(
                "hold_for_locality_period cannot exceed apply_preferred_period"
            ));
        }
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(anyhow!("metrics.port cannot be 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_an_empty_rootdir() {
        let raw = RawConfig {
            rootdir: String::new(),
            root_znode: default_root_znode(),
            backup: false,
            min_servers: 1,
            session_timeout: default_session_timeout(),
            thread_wake_frequency: default_thread_wake_frequency(),
            rs_lease_timeout: default_rs_lease_timeout(),
            assignment_timeout: default_assignment_timeout(),
            apply_preferred_period: default_apply_preferred_period(),
            hold_for_locality_period: default_hold_for_locality_period(),
            snapshot_validity: default_snapshot_validity(),
            locality_scan_pool_size: default_locality_scan_pool_size(),
            num_retries: default_num_retries(),
            retry_backoff: default_retry_backoff(),
            max_concurrent_reopens: default_max_concurrent_reopens(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            log_level: default_log_level(),
            metrics: MetricsConfig::default(),
        };
        let config = Config {
            rootdir: raw.rootdir,
            root_znode: raw.root_znode,
            backup: raw.backup,
            min_servers: raw.min_servers,
            session_timeout: raw.session_timeout,
            thread_wake_frequency: raw.thread_wake_frequency,
            rs_lease_timeout: raw.rs_lease_timeout,
            assignment_timeout: raw.assignment_timeout,
            apply_preferred_period: raw.apply_preferred_period,
            hold_for_locality_period: raw.hold_for_locality_period,
            snapshot_validity: raw.snapshot_validity,
            locality_scan_pool_size: raw.locality_scan_pool_size,
            num_retries: raw.num_retries,
            retry_backoff: raw.retry_backoff,
            max_concurrent_reopens: raw.max_concurrent_reopens,
            queue_capacity: raw.queue_capacity,
            max_attempts: raw.max_attempts,
            log_level: raw.log_level,
            metrics: raw.metrics,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_a_hold_period_longer_than_the_apply_period() {
        let config = Config {
            rootdir: "/data".to_string(),
            root_znode: default_root_znode(),
            backup: false,
            min_servers: 1,
            session_timeout: default_session_timeout(),
            thread_wake_frequency: default_thread_wake_frequency(),
            rs_lease_timeout: default_rs_lease_timeout(),
            assignment_timeout: default_assignment_timeout(),
            apply_preferred_period: Duration::from_secs(10),
            hold_for_locality_period: Duration::from_secs(20),
            snapshot_validity: default_snapshot_validity(),
            locality_scan_pool_size: default_locality_scan_pool_size(),
            num_retries: default_num_retries(),
            retry_backoff: default_retry_backoff(),
            max_concurrent_reopens: default_max_concurrent_reopens(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            log_level: default_log_level(),
            metrics: MetricsConfig::default(),
        };
        assert!(config.validate().is_err());
    }
}
