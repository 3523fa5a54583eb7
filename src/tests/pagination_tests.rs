use crate::model::{Message, Page, Timestamp};
use crate::pagination::*;

fn create_page(times: &[i64], is_last_page: bool) -> Page<Message> {
    let items = times
        .iter()
        .map(|t| Message::new(format!("m{}", t), "c1", "peer", "text", Timestamp(*t)))
        .collect();
    Page::new(items, is_last_page)
}

#[test]
fn test_cursor_creation() {
    let pager = PaginationCursor::new("c1".into(), 30);
    let cursor = pager.cursor();
    assert_eq!(cursor.conversation_id.as_str(), "c1");
    assert_eq!(cursor.oldest_loaded_at, None);
    assert!(cursor.has_more_older);
    assert!(!cursor.loading);
}

#[test]
fn test_first_request_fetches_newest_page() {
    let mut pager = PaginationCursor::new("c1".into(), 30);
    let request = pager.request_older().expect("Failed to request history");

    assert_eq!(request.conversation_id.as_str(), "c1");
    assert_eq!(request.before, None);
    assert_eq!(request.page_size, 30);
    assert!(pager.is_loading());
}

#[test]
fn test_request_while_loading_is_refused() {
    let mut pager = PaginationCursor::new("c1".into(), 30);
    assert!(pager.request_older().is_some());
    assert!(pager.request_older().is_none());
    assert!(pager.is_loading());
}

#[test]
fn test_completed_page_moves_boundary_back() {
    let mut pager = PaginationCursor::new("c1".into(), 3);
    pager.request_older();

    let advance = pager.complete_older(&create_page(&[400, 500, 600], false));
    assert!(advance.first_load);
    assert!(advance.has_more_older);
    assert_eq!(pager.cursor().oldest_loaded_at, Some(Timestamp(400)));
    assert!(!pager.is_loading());

    let request = pager.request_older().expect("Failed to request history");
    assert_eq!(request.before, Some(Timestamp(400)));

    let advance = pager.complete_older(&create_page(&[100, 200, 300], false));
    assert!(!advance.first_load);
    assert_eq!(pager.cursor().oldest_loaded_at, Some(Timestamp(100)));
}

#[test]
fn test_last_page_stops_paging() {
    let mut pager = PaginationCursor::new("c1".into(), 30);
    pager.request_older();
    let advance = pager.complete_older(&create_page(&[100, 200], true));

    assert!(!advance.has_more_older);
    assert!(!pager.has_more_older());
    assert!(pager.request_older().is_none());
}

#[test]
fn test_empty_conversation() {
    let mut pager = PaginationCursor::new("c1".into(), 30);
    pager.request_older();
    let advance = pager.complete_older(&Page::empty());

    assert!(!advance.first_load);
    assert!(!advance.has_more_older);
    assert_eq!(pager.cursor().oldest_loaded_at, None);
}

#[test]
fn test_failed_fetch_can_be_retried() {
    let mut pager = PaginationCursor::new("c1".into(), 30);
    pager.request_older();
    pager.fail_older();

    assert!(!pager.is_loading());
    assert!(pager.has_more_older());
    let request = pager.request_older().expect("Failed to request history");
    assert_eq!(request.before, None);
}

#[test]
fn test_zero_page_size_is_clamped() {
    let mut pager = PaginationCursor::new("c1".into(), 0);
    let request = pager.request_older().expect("Failed to request history");
    assert_eq!(request.page_size, 1);
}

#[test]
fn test_scroll_anchor_keeps_content_in_place() {
    let anchor = ScrollAnchor::capture(1_200.0);
    assert_eq!(anchor.offset_adjustment(1_800.0), 600.0);
    assert_eq!(anchor.offset_adjustment(1_200.0), 0.0);
}
