use crate::model::*;

fn create_attachment() -> AttachmentRef {
    AttachmentRef {
        url: "https://files.example/abc".to_string(),
        file_name: "notes.pdf".to_string(),
        mime_type: "application/pdf".to_string(),
        size_bytes: 2_048,
    }
}

#[test]
fn test_timestamp_arithmetic() {
    let t = Timestamp(1_000);
    assert_eq!(t.plus_millis(500), Timestamp(1_500));
    assert_eq!(t.abs_diff(Timestamp(400)), 600);
    assert_eq!(Timestamp(400).abs_diff(t), 600);
    assert!(Timestamp::now().as_millis() > 0);
}

#[test]
fn test_timestamp_plus_millis_saturates() {
    assert_eq!(Timestamp(0).plus_millis(u64::MAX), Timestamp(i64::MAX));
    assert_eq!(Timestamp(1_000).plus_millis(i64::MAX as u64), Timestamp(i64::MAX));
    assert_eq!(Timestamp(-1_000).plus_millis(1_000), Timestamp(0));
}

#[test]
fn test_message_type_defaults_to_text() {
    assert_eq!(MessageType::default(), MessageType::Text);

    let payload: OutgoingPayload =
        serde_json::from_str(r#"{"content":"hi"}"#).expect("Failed to deserialize payload");
    assert_eq!(payload.message_type, MessageType::Text);
}

#[test]
fn test_message_builders() {
    let message = Message::new("m1", "c1", "alice", "see attached", Timestamp(10))
        .with_client_temp_id("tmp-1")
        .with_attachment(create_attachment());

    assert_eq!(message.message_type, MessageType::File);
    assert_eq!(message.client_temp_id, Some(ClientTempId::from("tmp-1")));
    assert!(message.is_from(&UserId::from("alice")));
    assert!(!message.is_from(&UserId::from("bob")));
    assert_eq!(message.sort_key(), (Timestamp(10), "m1"));
    assert_eq!(message.read_at, None);
}

#[test]
fn test_outgoing_payloads() {
    let text = OutgoingPayload::text("hi");
    assert_eq!(text.message_type, MessageType::Text);
    assert!(text.attachment.is_none());

    let file = OutgoingPayload::file(create_attachment(), "report");
    assert_eq!(file.message_type, MessageType::File);
    assert_eq!(file.content, "report");
    assert_eq!(
        file.attachment.map(|attachment| attachment.file_name),
        Some("notes.pdf".to_string())
    );
}

#[test]
fn test_message_json_shape() {
    let message = Message::new("m1", "c1", "alice", "hello", Timestamp(10));
    let json = serde_json::to_value(&message).expect("Failed to serialize message");

    assert_eq!(json["id"], "m1");
    assert_eq!(json["conversation_id"], "c1");
    assert_eq!(json["created_at"], 10);
}

#[test]
fn test_participant_goes_offline() {
    let mut participant = Participant::new("bob", "bob", "Bob");
    assert!(!participant.is_online);

    participant.set_online(true, None, Timestamp(100));
    assert!(participant.is_online);
    assert_eq!(participant.last_seen_at, None);

    participant.set_online(false, None, Timestamp(200));
    assert!(!participant.is_online);
    assert_eq!(participant.last_seen_at, Some(Timestamp(200)));

    participant.set_online(false, Some(Timestamp(150)), Timestamp(300));
    assert_eq!(participant.last_seen_at, Some(Timestamp(150)));
}

#[test]
fn test_page() {
    let page: Page<Message> = Page::empty();
    assert!(page.is_empty());
    assert!(page.is_last_page);
}
