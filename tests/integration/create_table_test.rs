// tests/integration/create_table_test.rs

//! Scenario 4: `create_table` while no region servers are registered.

use tablemaster::core::errors::MasterError;
use tablemaster::core::region::TableSchema;
use tablemaster::core::server_info::ServerInfo;

use super::helpers::test_core;

#[tokio::test]
async fn create_table_fails_with_insufficient_servers_then_succeeds_once_one_joins() {
    let dir = tempfile::tempdir().unwrap();
    let master = test_core(dir.path().to_path_buf());

    let schema = TableSchema::new("orders", vec!["cf".to_string()]);
    let err = master
        .tableops
        .create_table(
            "orders",
            schema.clone(),
            &[],
            &master.registry,
            true,
            &master.assignment,
            master.next_region_id,
            |name| master.catalog.contains_key(name),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MasterError::InsufficientServers));
    assert!(master.assignment.is_empty());

    master
        .registry
        .record_startup(ServerInfo::new("127.0.0.1:9000".parse().unwrap(), 1), false);

    let regions = master
        .tableops
        .create_table(
            "orders",
            schema,
            &[],
            &master.registry,
            true,
            &master.assignment,
            master.next_region_id,
            |name| master.catalog.contains_key(name),
        )
        .await
        .unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(master.assignment.len(), 1);
}
