use tfidx_primitives::{
    BlockEvents, PowerState, PowerStateChange, PowerTarget, PowerTargetChange, UptimeReport
};
use tfidx_storage::{ConsistencyError, Database};


fn empty() -> BlockEvents {
    BlockEvents::default()
}

fn power_state(node_id: u32, new_state: PowerState, down_at: Option<u64>) -> BlockEvents {
    BlockEvents {
        power_state: vec![PowerStateChange { node_id, new_state, down_at }],
        ..Default::default()
    }
}

#[test]
fn commit_advances_resume_height() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();

    assert_eq!(db.resume_height(), None);

    db.commit_block(100, "0xaa", 1_700_000_000, &empty(), false).unwrap();
    db.commit_block(101, "0xab", 1_700_000_006, &empty(), false).unwrap();

    assert_eq!(db.resume_height(), Some(101));
    assert_eq!(db.verify_progress().unwrap(), Some((100, 101)));
}

#[test]
fn resume_height_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::open(dir.path()).unwrap();
        db.commit_block(7, "0x07", 1_700_000_000, &empty(), false).unwrap();
        db.commit_block(8, "0x08", 1_700_000_006, &empty(), false).unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    assert_eq!(db.resume_height(), Some(8));
    assert_eq!(db.verify_progress().unwrap(), Some((7, 8)));
}

#[test]
fn rejects_gap_and_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();

    db.commit_block(100, "0xaa", 1_700_000_000, &empty(), false).unwrap();

    let gap = db
        .commit_block(102, "0xac", 1_700_000_012, &empty(), false)
        .unwrap_err();
    assert_eq!(
        gap.downcast_ref::<ConsistencyError>(),
        Some(&ConsistencyError::OutOfOrderCommit { expected: 101, got: 102 })
    );

    let dup = db
        .commit_block(100, "0xaa", 1_700_000_000, &empty(), false)
        .unwrap_err();
    assert!(dup.downcast_ref::<ConsistencyError>().is_some());

    // the rejected commits left nothing behind
    let snapshot = db.snapshot();
    assert_eq!(snapshot.processed_heights().unwrap(), vec![100]);
    assert!(snapshot.get_processed_block(102).unwrap().is_none());
}

#[test]
fn rejected_commit_writes_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();

    db.commit_block(10, "0x0a", 1_700_000_000, &empty(), false).unwrap();

    let events = power_state(42, PowerState::Down, Some(12));
    assert!(db.commit_block(12, "0x0c", 1_700_000_012, &events, false).is_err());

    let snapshot = db.snapshot();
    assert!(snapshot.get_node(42).unwrap().is_none());
    assert!(snapshot.power_state_events(42).unwrap().is_empty());
}

#[test]
fn power_state_events_chain() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();

    db.commit_block(
        100,
        "0xaa",
        1_700_000_000,
        &power_state(42, PowerState::Down, Some(100)),
        false
    ).unwrap();
    db.commit_block(101, "0xab", 1_700_000_006, &empty(), false).unwrap();
    db.commit_block(
        102,
        "0xac",
        1_700_000_012,
        &power_state(42, PowerState::Up, None),
        false
    ).unwrap();

    let snapshot = db.snapshot();
    let events = snapshot.power_state_events(42).unwrap();
    assert_eq!(events.len(), 2);

    // a node with no prior events starts from the chain default, Up
    assert_eq!(events[0].previous_state, PowerState::Up);
    assert_eq!(events[0].new_state, PowerState::Down);
    assert_eq!(events[0].down_at, Some(100));
    assert_eq!(events[0].block_height, 100);

    assert_eq!(events[1].previous_state, PowerState::Down);
    assert_eq!(events[1].new_state, PowerState::Up);

    let node = snapshot.get_node(42).unwrap().unwrap();
    assert_eq!(node.state, PowerState::Up);
    assert_eq!(node.updated_at_height, 102);
}

#[test]
fn first_target_event_starts_from_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();

    let events = BlockEvents {
        power_target: vec![PowerTargetChange { node_id: 5, new_target: PowerTarget::Down }],
        ..Default::default()
    };
    db.commit_block(50, "0x32", 1_700_000_000, &events, false).unwrap();

    let snapshot = db.snapshot();
    let events = snapshot.power_target_events(5).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].previous_target, PowerTarget::Unset);
    assert_eq!(events[0].new_target, PowerTarget::Down);

    let node = snapshot.get_node(5).unwrap().unwrap();
    assert_eq!(node.target, PowerTarget::Down);
    // a target change alone does not touch the power state
    assert_eq!(node.state, PowerState::Up);
}

#[test]
fn uptime_events_are_stored_per_block() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();

    let events = BlockEvents {
        uptime: vec![
            UptimeReport { node_id: 1, uptime_secs: 3600, timestamp_hint: 1_700_000_000 },
            UptimeReport { node_id: 2, uptime_secs: 60, timestamp_hint: 1_700_000_000 }
        ],
        ..Default::default()
    };
    db.commit_block(20, "0x14", 1_700_000_000, &events, false).unwrap();

    let snapshot = db.snapshot();
    let uptime = snapshot.uptime_events(1).unwrap();
    assert_eq!(uptime.len(), 1);
    assert_eq!(uptime[0].uptime_secs, 3600);
    assert_eq!(uptime[0].block_height, 20);
    assert_eq!(uptime[0].block_timestamp, 1_700_000_000);

    assert_eq!(snapshot.uptime_events(2).unwrap().len(), 1);
    assert!(snapshot.uptime_events(3).unwrap().is_empty());
}

#[test]
fn anomalous_block_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();

    db.commit_block(30, "0x1e", 1_700_000_000, &empty(), true).unwrap();

    let processed = db.snapshot().get_processed_block(30).unwrap().unwrap();
    assert!(processed.anomalous);
    assert_eq!(processed.block_hash, "0x1e");
    assert_eq!(db.resume_height(), Some(30));
}

#[test]
fn committed_blocks_are_all_or_nothing_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::open(dir.path()).unwrap();

        let full = BlockEvents {
            uptime: vec![
                UptimeReport { node_id: 42, uptime_secs: 3600, timestamp_hint: 1_700_000_000 }
            ],
            power_state: vec![
                PowerStateChange { node_id: 42, new_state: PowerState::Down, down_at: Some(101) }
            ],
            power_target: vec![
                PowerTargetChange { node_id: 42, new_target: PowerTarget::Down }
            ]
        };
        db.commit_block(100, "0xaa", 1_700_000_000, &empty(), false).unwrap();
        db.commit_block(101, "0xab", 1_700_000_006, &full, false).unwrap();

        // a rejected commit right before the simulated crash must
        // leave no trace either
        let orphan = power_state(43, PowerState::Down, Some(103));
        assert!(db.commit_block(103, "0xad", 1_700_000_018, &orphan, false).is_err());
    }

    // process died and restarted: every committed height has all of
    // its rows, every uncommitted height has none
    let db = Database::open(dir.path()).unwrap();
    assert_eq!(db.resume_height(), Some(101));

    let snapshot = db.snapshot();
    assert_eq!(snapshot.processed_heights().unwrap(), vec![100, 101]);

    let uptime = snapshot.uptime_events(42).unwrap();
    let states = snapshot.power_state_events(42).unwrap();
    let targets = snapshot.power_target_events(42).unwrap();
    assert_eq!(uptime.len(), 1);
    assert_eq!(states.len(), 1);
    assert_eq!(targets.len(), 1);
    assert_eq!(uptime[0].block_height, 101);
    assert_eq!(states[0].block_height, 101);
    assert_eq!(targets[0].block_height, 101);

    let node = snapshot.get_node(42).unwrap().unwrap();
    assert_eq!(node.state, PowerState::Down);
    assert_eq!(node.target, PowerTarget::Down);
    assert_eq!(node.updated_at_height, 101);

    assert!(snapshot.get_node(43).unwrap().is_none());
    assert!(snapshot.power_state_events(43).unwrap().is_empty());
    assert!(snapshot.get_processed_block(103).unwrap().is_none());
}


#[test]
fn truncate_resets_everything() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();

    db.commit_block(
        100,
        "0xaa",
        1_700_000_000,
        &power_state(42, PowerState::Down, Some(100)),
        false
    ).unwrap();

    db.truncate().unwrap();

    assert_eq!(db.resume_height(), None);
    let snapshot = db.snapshot();
    assert!(snapshot.list_nodes().unwrap().is_empty());
    assert!(snapshot.processed_heights().unwrap().is_empty());

    // the store accepts a fresh base after truncation
    db.commit_block(1, "0x01", 1_700_000_000, &empty(), false).unwrap();
    assert_eq!(db.resume_height(), Some(1));
}
