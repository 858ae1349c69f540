// src/core/region.rs

//! The region identity model: `Region`, its key range, and the two
//! distinguished catalog regions (root and META).

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The well-known table name of the singleton root region.
pub const ROOT_TABLE_NAME: &str = "-ROOT-";
/// The well-known table name of a META region.
pub const META_TABLE_NAME: &str = ".META.";

/// A column family or table-wide setting snapshot carried by a `Region`.
///
/// Regions hold a copy of the owning table's schema at assignment time, not
/// a live reference, so a concurrent `alter_table` cannot retroactively
/// change what an already-open region believes its schema to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub column_families: Vec<String>,
    pub version: u64,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>, column_families: Vec<String>) -> Self {
        Self {
            table_name: table_name.into(),
            column_families,
            version: 1,
        }
    }
}

/// Which tier of the catalog a region belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionKind {
    Root,
    Meta,
    User,
}

/// Immutable identity of a region: `(table_name, start_key, end_key, region_id)`.
///
/// `start_key`/`end_key` are byte strings; an empty `start_key` means
/// `-infinity` and an empty `end_key` means `+infinity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub table_name: String,
    pub start_key: Bytes,
    pub end_key: Bytes,
    pub region_id: u64,
    #[serde(skip)]
    pub schema: Option<Arc<TableSchema>>,
}

impl Region {
    pub fn new(table_name: impl Into<String>, start_key: Bytes, end_key: Bytes, region_id: u64) -> Self {
        Self {
            table_name: table_name.into(),
            start_key,
            end_key,
            region_id,
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Arc<TableSchema>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Derives the catalog tier from `table_name`: two
    /// distinguished regions exist cluster-wide, identified by well-known
    /// table names rather than a separate flag.
    pub fn kind(&self) -> RegionKind {
        match self.table_name.as_str() {
            ROOT_TABLE_NAME => RegionKind::Root,
            META_TABLE_NAME => RegionKind::Meta,
            _ => RegionKind::User,
        }
    }

    /// Whether `key` falls within `[start_key, end_key)`, treating an empty
    /// bound as the corresponding infinity.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        let above_start = self.start_key.is_empty() || key >= self.start_key.as_ref();
        let below_end = self.end_key.is_empty() || key < self.end_key.as_ref();
        above_start && below_end
    }

    /// A stable identifier string used as a coordination-store path segment
    /// and as a META row key prefix (`tableName,startKey,regionId`).
    pub fn encoded_name(&self) -> String {
        format!(
            "{},{},{}",
            self.table_name,
            String::from_utf8_lossy(&self.start_key),
            self.region_id
        )
    }
}

/// Splits `[-inf, +inf)` into `split_keys.len() + 1` contiguous regions for a
/// newly created table, daisy-chaining each key as one region's `end_key`
/// and the next region's `start_key` when creating a table.
pub fn partition_regions(table_name: &str, split_keys: &[Bytes], first_region_id: u64) -> Vec<Region> {
    let mut bounds: Vec<Bytes> = Vec::with_capacity(split_keys.len() + 2);
    bounds.push(Bytes::new());
    bounds.extend(split_keys.iter().cloned());
    bounds.push(Bytes::new());

    bounds
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            Region::new(
                table_name,
                w[0].clone(),
                w[1].clone(),
                first_region_id + i as u64,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_cover_the_full_keyspace() {
        let keys = vec![Bytes::from_static(b"g"), Bytes::from_static(b"m")];
        let regions = partition_regions("t", &keys, 1);
        assert_eq!(regions.len(), 3);
        assert!(regions[0].start_key.is_empty());
        assert_eq!(regions[0].end_key, Bytes::from_static(b"g"));
        assert_eq!(regions[1].start_key, Bytes::from_static(b"g"));
        assert_eq!(regions[1].end_key, Bytes::from_static(b"m"));
        assert_eq!(regions[2].start_key, Bytes::from_static(b"m"));
        assert!(regions[2].end_key.is_empty());
    }

    #[test]
    fn no_split_keys_yields_one_region() {
        let regions = partition_regions("t", &[], 1);
        assert_eq!(regions.len(), 1);
        assert!(regions[0].start_key.is_empty());
        assert!(regions[0].end_key.is_empty());
    }

    #[test]
    fn contains_key_handles_open_bounds() {
        let r = Region::new("t", Bytes::from_static(b"g"), Bytes::from_static(b"m"), 1);
        assert!(!r.contains_key(b"a"));
        assert!(r.contains_key(b"g"));
        assert!(r.contains_key(b"j"));
        assert!(!r.contains_key(b"m"));
    }

    #[test]
    fn root_and_meta_are_recognized_by_name() {
        let root = Region::new(ROOT_TABLE_NAME, Bytes::new(), Bytes::new(), 0);
        let meta = Region::new(META_TABLE_NAME, Bytes::new(), Bytes::new(), 1);
        let user = Region::new("orders", Bytes::new(), Bytes::new(), 2);
        assert_eq!(root.kind(), RegionKind::Root);
        assert_eq!(meta.kind(), RegionKind::Meta);
        assert_eq!(user.kind(), RegionKind::User);
    }
}
