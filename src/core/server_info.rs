// src/core/server_info.rs

//! Region-server identity and reported load.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Load figures reported by a region server on `Startup`/`Report`.
///
/// Ordered by region count, then request rate, then storefile size, which
/// is the tie-break chain `ServerRegistry::light_servers`/`Assigner` use to
/// rank candidates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServerLoad {
    pub region_count: u32,
    pub request_rate: f64,
    pub storefile_size_bytes: u64,
}

impl Default for ServerLoad {
    fn default() -> Self {
        Self {
            region_count: 0,
            request_rate: 0.0,
            storefile_size_bytes: 0,
        }
    }
}

impl ServerLoad {
    fn rank_key(&self) -> (u32, u64, u64) {
        // `request_rate` is a float; compare it through a fixed-point
        // projection so the overall key can derive a total `Ord` without
        // pulling in a NaN-aware float-ordering crate for one field.
        (
            self.region_count,
            (self.request_rate.max(0.0) * 1000.0) as u64,
            self.storefile_size_bytes,
        )
    }
}

impl PartialOrd for ServerLoad {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for ServerLoad {}

impl Ord for ServerLoad {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank_key().cmp(&other.rank_key())
    }
}

/// `(server_name, host:port, start_code, load)`.
///
/// `server_name` embeds `start_code` so that a region server restarted at
/// the same address (a reincarnation) is distinguishable from the process
/// it replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub addr: SocketAddr,
    pub start_code: u64,
    pub load: ServerLoad,
}

impl ServerInfo {
    pub fn new(addr: SocketAddr, start_code: u64) -> Self {
        Self {
            addr,
            start_code,
            load: ServerLoad::default(),
        }
    }

    pub fn server_name(&self) -> String {
        format!("{}-{}", self.addr, self.start_code)
    }

    /// Recovers `(addr, start_code)` from a `server_name` string previously
    /// produced by [`Self::server_name`]. Used when reconstructing
    /// [`ServerInfo`] from a coordination-store child listing, which carries
    /// only the name, during failover reconstruction.
    pub fn parse_server_name(server_name: &str) -> Option<(SocketAddr, u64)> {
        let (addr_part, start_code_part) = server_name.rsplit_once('-')?;
        let addr = addr_part.parse().ok()?;
        let start_code = start_code_part.parse().ok()?;
        Some((addr, start_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_orders_by_region_count_first() {
        let light = ServerLoad {
            region_count: 1,
            request_rate: 1000.0,
            storefile_size_bytes: u64::MAX,
        };
        let heavy = ServerLoad {
            region_count: 2,
            request_rate: 0.0,
            storefile_size_bytes: 0,
        };
        assert!(light < heavy);
    }

    #[test]
    fn load_breaks_ties_on_request_rate_then_storefile_size() {
        let a = ServerLoad {
            region_count: 1,
            request_rate: 10.0,
            storefile_size_bytes: 5,
        };
        let b = ServerLoad {
            region_count: 1,
            request_rate: 20.0,
            storefile_size_bytes: 0,
        };
        assert!(a < b);
    }

    #[test]
    fn server_name_embeds_start_code() {
        let info = ServerInfo::new("127.0.0.1:9000".parse().unwrap(), 42);
        assert_eq!(info.server_name(), "127.0.0.1:9000-42");
    }

    #[test]
    fn server_name_round_trips_through_parsing() {
        let info = ServerInfo::new("127.0.0.1:9000".parse().unwrap(), 42);
        let (addr, start_code) = ServerInfo::parse_server_name(&info.server_name()).unwrap();
        assert_eq!(addr, info.addr);
        assert_eq!(start_code, info.start_code);
    }

    #[test]
    fn parse_server_name_rejects_garbage() {
        assert!(ServerInfo::parse_server_name("not-a-server-name").is_none());
    }
}
