// tests/integration/explicit_split_test.rs

//! Scenario 5: an explicit split request against a live region, and the
//! rejection of one whose split point falls outside the region's range.

use bytes::Bytes;
use tablemaster::core::assignment::AssignmentState;
use tablemaster::core::errors::MasterError;
use tablemaster::core::queue::AdminAction;
use tablemaster::core::region::Region;

use super::helpers::test_core;

#[tokio::test]
async fn explicit_split_inside_the_range_marks_the_region_splitting() {
    let dir = tempfile::tempdir().unwrap();
    let master = test_core(dir.path().to_path_buf());
    let region = Region::new("orders", Bytes::from_static(b"a"), Bytes::from_static(b"m"), 10);
    master.assignment.insert_new(region);
    master
        .assignment
        .set_state(10, AssignmentState::PendingOpen, Some("rs1".to_string()))
        .unwrap();
    master
        .assignment
        .set_state(10, AssignmentState::Open, Some("rs1".to_string()))
        .unwrap();

    master
        .tableops
        .modify_table(
            AdminAction::ExplicitSplit {
                region_id: 10,
                split_point: Bytes::from_static(b"g"),
            },
            &master.assignment,
            &master.oracle,
        )
        .unwrap();

    assert_eq!(master.assignment.get(10).unwrap().state, AssignmentState::Splitting);
}

#[tokio::test]
async fn explicit_split_outside_the_range_fails_with_invalid_split_point() {
    let dir = tempfile::tempdir().unwrap();
    let master = test_core(dir.path().to_path_buf());
    let region = Region::new("orders", Bytes::from_static(b"a"), Bytes::from_static(b"m"), 11);
    master.assignment.insert_new(region);
    master
        .assignment
        .set_state(11, AssignmentState::PendingOpen, Some("rs1".to_string()))
        .unwrap();
    master
        .assignment
        .set_state(11, AssignmentState::Open, Some("rs1".to_string()))
        .unwrap();

    let err = master
        .tableops
        .modify_table(
            AdminAction::ExplicitSplit {
                region_id: 11,
                split_point: Bytes::from_static(b"z"),
            },
            &master.assignment,
            &master.oracle,
        )
        .unwrap_err();

    assert!(matches!(err, MasterError::InvalidSplitPoint));
    assert_eq!(master.assignment.get(11).unwrap().state, AssignmentState::Open);
}
