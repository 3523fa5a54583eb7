use crate::model::{Message, Timestamp};
use crate::receipts::*;

fn marker(id: &str, at: i64) -> ReadMarker {
    ReadMarker::new(id, Timestamp(at))
}

#[test]
fn test_tracker_creation() {
    let tracker = ReadReceiptTracker::new("c1".into());
    let state = tracker.state();
    assert_eq!(state.last_read, None);
    assert!(!state.mark_in_flight);
    assert_eq!(state.last_marked_at, None);
}

#[test]
fn test_mark_read_issues_one_request_at_a_time() {
    let mut tracker = ReadReceiptTracker::new("c1".into());

    let request = tracker.mark_read(marker("m5", 500)).expect("Failed to mark read");
    assert_eq!(request.conversation_id.as_str(), "c1");
    assert_eq!(request.up_to, marker("m5", 500));
    assert!(tracker.state().mark_in_flight);

    assert!(tracker.mark_read(marker("m6", 600)).is_none());
}

#[test]
fn test_acknowledgement_advances_read_position() {
    let mut tracker = ReadReceiptTracker::new("c1".into());
    tracker.mark_read(marker("m5", 500));

    assert!(tracker.complete_mark(marker("m5", 500), Timestamp(1_000)));

    let state = tracker.state();
    assert!(!state.mark_in_flight);
    assert_eq!(state.last_read_message_id().map(|id| id.as_str()), Some("m5"));
    assert_eq!(state.last_marked_at, Some(Timestamp(1_000)));
}

#[test]
fn test_read_position_never_moves_backwards() {
    let mut tracker = ReadReceiptTracker::new("c1".into());
    tracker.mark_read(marker("m5", 500));
    tracker.complete_mark(marker("m5", 500), Timestamp(1_000));

    // Older or equal positions do not produce a request
    assert!(tracker.mark_read(marker("m3", 300)).is_none());
    assert!(tracker.mark_read(marker("m5", 500)).is_none());

    // A late acknowledgement for an older message does not regress
    assert!(!tracker.complete_mark(marker("m3", 300), Timestamp(1_100)));
    assert_eq!(tracker.last_read(), Some(&marker("m5", 500)));
}

#[test]
fn test_failed_mark_can_be_retried() {
    let mut tracker = ReadReceiptTracker::new("c1".into());
    tracker.mark_read(marker("m5", 500));
    tracker.fail_mark();

    assert!(!tracker.state().mark_in_flight);
    assert_eq!(tracker.last_read(), None);
    assert!(tracker.mark_read(marker("m5", 500)).is_some());
}

#[test]
fn test_remote_ack_leaves_request_in_flight() {
    let mut tracker = ReadReceiptTracker::new("c1".into());
    tracker.mark_read(marker("m5", 500));

    assert!(tracker.apply_remote_ack(marker("m7", 700), Timestamp(900)));
    assert!(tracker.state().mark_in_flight);

    // Our own acknowledgement arrives later and is older
    assert!(!tracker.complete_mark(marker("m5", 500), Timestamp(1_000)));
    assert_eq!(tracker.last_read(), Some(&marker("m7", 700)));
    assert!(!tracker.state().mark_in_flight);
}

#[test]
fn test_marker_ordering() {
    assert!(marker("z", 100) < marker("a", 200));
    assert!(marker("a", 100) < marker("b", 100));

    let read_to = marker("m5", 500);
    let newer = Message::new("m6", "c1", "peer", "x", Timestamp(600));
    let same = Message::new("m5", "c1", "peer", "x", Timestamp(500));
    let older = Message::new("m4", "c1", "peer", "x", Timestamp(400));
    assert!(read_to.is_before(&newer));
    assert!(!read_to.is_before(&same));
    assert!(!read_to.is_before(&older));
    assert_eq!(ReadMarker::for_message(&same), read_to);
}
