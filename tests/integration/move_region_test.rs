// tests/integration/move_region_test.rs

//! Scenario 6: an operator-requested move closes the region on its
//! current holder and reassigns it to the requested target once it
//! reports back in.

use bytes::Bytes;
use tablemaster::core::assignment::AssignmentState;
use tablemaster::core::queue::AdminAction;
use tablemaster::core::region::Region;
use tablemaster::core::server_info::ServerInfo;

use super::helpers::test_core;

#[tokio::test]
async fn move_region_records_the_target_as_preferred_and_requests_a_close() {
    let dir = tempfile::tempdir().unwrap();
    let master = test_core(dir.path().to_path_buf());

    master
        .registry
        .record_startup(ServerInfo::new("127.0.0.1:9100".parse().unwrap(), 1), false);
    master
        .registry
        .record_startup(ServerInfo::new("127.0.0.1:9200".parse().unwrap(), 1), false);

    let region = Region::new("orders", Bytes::new(), Bytes::new(), 20);
    master.assignment.insert_new(region);
    master
        .assignment
        .set_state(20, AssignmentState::PendingOpen, Some("127.0.0.1:9100-1".to_string()))
        .unwrap();
    master
        .assignment
        .set_state(20, AssignmentState::Open, Some("127.0.0.1:9100-1".to_string()))
        .unwrap();

    master
        .tableops
        .modify_table(
            AdminAction::MoveRegion {
                region_id: 20,
                target_server: "127.0.0.1:9200-1".to_string(),
            },
            &master.assignment,
            &master.oracle,
        )
        .unwrap();

    assert_eq!(master.assignment.get(20).unwrap().state, AssignmentState::PendingClose);
    assert_eq!(
        master.oracle.preferred_for(20).unwrap().ordered_servers,
        vec!["127.0.0.1:9200-1".to_string()]
    );

    // The close completes; `run_cycle` now has a preference on record for
    // the subsequent reassignment.
    master.assignment.set_state(20, AssignmentState::Closed, None).unwrap();
    master.assignment.set_state(20, AssignmentState::Unassigned, None).unwrap();

    let placed = master
        .assigner
        .run_cycle(
            &master.assignment,
            &master.registry,
            &master.oracle,
            master.master_started_at,
            master.config.apply_preferred_period,
            master.config.hold_for_locality_period,
        )
        .unwrap();
    assert_eq!(placed, vec![20]);
    assert_eq!(
        master.assignment.get(20).unwrap().target_server.as_deref(),
        Some("127.0.0.1:9200-1")
    );
}
