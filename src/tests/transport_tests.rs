use crate::events::FailureKind;
use crate::model::{ConversationId, Message, OutgoingPayload, Timestamp};
use crate::pagination::FetchOlderRequest;
use crate::presence::TypingSignal;
use crate::receipts::{MarkReadRequest, ReadMarker};
use crate::transport::*;
use crate::Error;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_test::block_on;

fn create_history(count: i64) -> Vec<Message> {
    (0..count)
        .map(|i| Message::new(format!("h{}", i), "c1", "peer", "text", Timestamp(i * 100)))
        .collect()
}

fn fetch(before: Option<i64>, page_size: u32) -> FetchOlderRequest {
    FetchOlderRequest {
        conversation_id: "c1".into(),
        before: before.map(Timestamp),
        page_size,
        generation: 0,
    }
}

#[test]
fn test_memory_transport_pages_backwards() {
    let transport = MemoryTransport::new("me");
    block_on(transport.seed("c1".into(), create_history(5)));

    let newest = block_on(transport.fetch_older(fetch(None, 3))).expect("Failed to fetch");
    let ids: Vec<&str> = newest.items.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["h2", "h3", "h4"]);
    assert!(!newest.is_last_page);

    let older = block_on(transport.fetch_older(fetch(Some(200), 3))).expect("Failed to fetch");
    let ids: Vec<&str> = older.items.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["h0", "h1"]);
    assert!(older.is_last_page);
}

#[test]
fn test_memory_transport_unknown_conversation() {
    let transport = MemoryTransport::new("me");
    let page = block_on(transport.fetch_older(FetchOlderRequest {
        conversation_id: "nope".into(),
        before: None,
        page_size: 10,
        generation: 0,
    }))
    .expect("Failed to fetch");
    assert!(page.is_empty());
    assert!(page.is_last_page);
}

#[test]
fn test_memory_transport_send_echoes_with_correlation() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let transport = MemoryTransport::new("me").with_echo(tx);

    let message = block_on(transport.send(OutboundSend {
        conversation_id: "c1".into(),
        client_temp_id: "tmp-abc-0".into(),
        payload: OutgoingPayload::text("hello"),
        generation: 1,
    }))
    .expect("Failed to send");

    assert_eq!(message.id.as_str(), "srv-1");
    assert_eq!(message.sender_id.as_str(), "me");
    assert_eq!(message.content, "hello");
    assert_eq!(block_on(transport.stored_count(&"c1".into())), 1);

    match rx.try_recv().expect("Echo missing") {
        InboundEvent::NewMessage {
            message: echoed,
            correlation,
        } => {
            assert_eq!(echoed, message);
            assert_eq!(correlation.map(|id| id.to_string()), Some("tmp-abc-0".to_string()));
        }
        other => panic!("Unexpected event: {:?}", other),
    }
}

#[test]
fn test_memory_transport_failure_mode() {
    let transport = MemoryTransport::new("me");
    block_on(transport.set_failing(FailureKind::MarkRead, true));

    let request = MarkReadRequest {
        conversation_id: "c1".into(),
        up_to: ReadMarker::new("h1", Timestamp(100)),
        generation: 0,
    };
    let result = block_on(transport.mark_read(request.clone()));
    assert!(matches!(result, Err(Error::Transport(_))));

    block_on(transport.set_failing(FailureKind::MarkRead, false));
    assert!(block_on(transport.mark_read(request)).is_ok());
}

#[test]
fn test_memory_transport_records_typing() {
    let transport = MemoryTransport::new("me");
    block_on(transport.send_typing("c1".into(), TypingSignal::Start)).expect("Failed to send typing");
    block_on(transport.send_typing("c1".into(), TypingSignal::Stop)).expect("Failed to send typing");

    assert_eq!(
        block_on(transport.typing_signals()),
        vec![
            (ConversationId::from("c1"), TypingSignal::Start),
            (ConversationId::from("c1"), TypingSignal::Stop),
        ]
    );
}

#[tokio::test]
async fn test_memory_transport_latency_delays_calls() {
    let latency = Duration::from_millis(40);
    let transport = MemoryTransport::new("me").with_latency(latency);
    transport.seed("c1".into(), create_history(2)).await;

    let started = Instant::now();
    let page = transport.fetch_older(fetch(None, 10)).await.expect("Failed to fetch");
    assert_eq!(page.items.len(), 2);
    assert!(started.elapsed() >= latency);
}
