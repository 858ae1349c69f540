// tests/integration/server_death_test.rs

//! Scenario 3: a region server dies while holding several regions; its
//! regions become unassigned and its log directory is split, then the
//! next assignment cycle picks them back up.

use std::sync::Arc;

use bytes::Bytes;
use tablemaster::core::queue::{OperationItem, OperationQueue};
use tablemaster::core::region::Region;
use tablemaster::core::server_info::ServerInfo;
use tokio::sync::mpsc;

use super::helpers::test_core;

#[tokio::test]
async fn a_dead_server_s_regions_are_unassigned_and_its_log_is_split() {
    let dir = tempfile::tempdir().unwrap();
    let mut master = test_core(dir.path().to_path_buf());

    for region_id in 0..5u64 {
        let region = Region::new("orders", Bytes::new(), Bytes::new(), region_id);
        master.assignment.insert_new(region);
    }

    let (queue, queue_handle) = OperationQueue::new(16, 2);
    let (rpc_tx, rpc_rx) = mpsc::channel(16);
    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let handle = tablemaster::server::MasterHandle::new(rpc_tx, running);

    queue_handle
        .enqueue(OperationItem::ProcessServerStartup {
            server: ServerInfo::new("127.0.0.1:9100".parse().unwrap(), 1),
        })
        .await
        .unwrap();

    let join = tokio::spawn(async move { master.run(queue, rpc_rx).await });
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    // Drive every region from PENDING_OPEN to OPEN on RS1, as if it had
    // reported them opened.
    for region_id in 0..5u64 {
        queue_handle
            .enqueue(OperationItem::ProcessRegionOpened {
                region_id,
                server_name: "127.0.0.1:9100-1".to_string(),
            })
            .await
            .unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    let before = handle.get_cluster_status().await.unwrap();
    assert!(before.regions_in_transition.is_empty());

    let log_dir = dir.path().join(".logs").join("127.0.0.1:9100-1");
    tokio::fs::create_dir_all(&log_dir).await.unwrap();
    tokio::fs::write(log_dir.join("0000001.log"), b"wal").await.unwrap();

    // Terminate RS1: its session is lost, so the master processes its death.
    queue_handle
        .enqueue(OperationItem::ProcessServerDeath {
            server_name: "127.0.0.1:9100-1".to_string(),
        })
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let after = handle.get_cluster_status().await.unwrap();
    assert!(!after.servers.contains(&"127.0.0.1:9100-1".to_string()));
    // With no other live server to reassign to, the 5 regions stay
    // unassigned rather than in transition.
    assert!(after.regions_in_transition.is_empty());

    let split_dir = dir.path().join(".logs").join("127.0.0.1:9100-1");
    let splitting_dir = dir.path().join(".logs").join("127.0.0.1:9100-1-splitting");
    assert!(!split_dir.exists());
    assert!(!splitting_dir.exists(), "split recovery should have cleaned up on success");

    handle.stop_master().await.unwrap();
    join.await.unwrap();
}
