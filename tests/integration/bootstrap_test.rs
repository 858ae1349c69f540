// tests/integration/bootstrap_test.rs

//! Scenarios 1 and 2: fresh-cluster bootstrap and failover reconstruction.

use std::sync::Arc;

use bytes::Bytes;
use tablemaster::core::assignment::{AssignmentState, AssignmentTable};
use tablemaster::core::coord::CoordClient;
use tablemaster::core::coord::memory::{InMemoryCoordClient, SharedStore};
use tablemaster::core::queue::{OperationItem, OperationQueue, ReportMessage};
use tablemaster::core::region::{Region, ROOT_TABLE_NAME, META_TABLE_NAME};
use tablemaster::core::server_info::{ServerInfo, ServerLoad};
use tablemaster::server::bootstrap::{self, RegionServerClient};
use tablemaster::server::paths;
use tablemaster::server::RegionServerGateway;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::helpers::test_core;

#[tokio::test]
async fn fresh_cluster_bootstraps_root_and_meta_then_assigns_them_once_a_server_reports() {
    let dir = tempfile::tempdir().unwrap();
    let mut master = test_core(dir.path().to_path_buf());
    let next = bootstrap::bootstrap_fresh_cluster(&master.assignment);
    assert_eq!(master.assignment.get(0).unwrap().region.table_name, ROOT_TABLE_NAME);
    assert_eq!(master.assignment.get(1).unwrap().region.table_name, META_TABLE_NAME);
    master.next_region_id = next;

    let (queue, queue_handle) = OperationQueue::new(16, 2);
    let (rpc_tx, rpc_rx) = mpsc::channel(16);
    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let handle = tablemaster::server::MasterHandle::new(rpc_tx.clone(), running);
    let gateway = RegionServerGateway::new(
        queue_handle.clone(),
        rpc_tx,
        dir.path().to_string_lossy().to_string(),
        format!("file://{}", dir.path().display()),
    );
    let join = tokio::spawn(async move { master.run(queue, rpc_rx).await });

    queue_handle
        .enqueue(OperationItem::ProcessServerStartup {
            server: ServerInfo::new("127.0.0.1:9000".parse().unwrap(), 1),
        })
        .await
        .unwrap();

    // Give the loop a moment to process the startup and run an assignment cycle.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let status = handle.get_cluster_status().await.unwrap();
    assert_eq!(status.servers, vec!["127.0.0.1:9000-1".to_string()]);
    assert!(status.regions_in_transition.contains(&0));

    // RS1's next heartbeat reports root opened: the live path this
    // AssignmentTable entry can only reach through a real `Report`.
    gateway
        .region_server_report(
            "127.0.0.1:9000-1".to_string(),
            ServerLoad::default(),
            vec![ReportMessage::RegionOpened { region_id: 0 }],
        )
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let status = handle.get_cluster_status().await.unwrap();
    assert!(!status.regions_in_transition.contains(&0));

    handle.stop_master().await.unwrap();
    join.await.unwrap();
}

#[tokio::test]
async fn failover_reconstruction_marks_reported_regions_open_without_reassigning() {
    let store = SharedStore::new();
    let coord: Arc<dyn CoordClient> = Arc::new(InMemoryCoordClient::new(store, 1));
    coord
        .create_ephemeral(&paths::region_server_node("/tablemaster", "127.0.0.1:9001-1"), Bytes::new())
        .await
        .unwrap();

    struct ReportingRsClient {
        regions: Vec<Region>,
    }
    #[async_trait]
    impl RegionServerClient for ReportingRsClient {
        async fn report_regions(
            &self,
            _server: &ServerInfo,
        ) -> Result<Vec<Region>, tablemaster::core::MasterError> {
            Ok(self.regions.clone())
        }
    }

    let assignment = AssignmentTable::new();
    let client = ReportingRsClient {
        regions: vec![Region::new("orders", Bytes::new(), Bytes::new(), 5)],
    };
    let next = bootstrap::reconstruct_via_failover(&coord, "/tablemaster", &assignment, Some(&client))
        .await
        .unwrap();

    assert_eq!(next, 6);
    assert_eq!(assignment.get(5).unwrap().state, AssignmentState::Open);
}
