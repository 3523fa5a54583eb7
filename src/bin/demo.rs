//! Threadline demo
//!
//! Runs a session against the in-memory transport: opens a seeded
//! conversation, types, sends a message and loads older history, printing
//! every session event.
//!
//! Usage: `threadline-demo [settings.json]`

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use threadline::clock::SystemClock;
use threadline::events::ChannelSink;
use threadline::model::{ConversationId, Message, OutgoingPayload, Participant, Timestamp};
use threadline::transport::MemoryTransport;
use threadline::{ConversationSession, EngineSettings, SessionDriver};
use tokio::sync::mpsc;
use tracing::info;

const LOCAL_USER: &str = "alice";
const PEER: &str = "bob";

fn seed_history(conversation_id: &ConversationId, count: i64) -> Vec<Message> {
    let start = Timestamp::now().as_millis() - count * 60_000;
    (0..count)
        .map(|i| {
            let sender = if i % 2 == 0 { PEER } else { LOCAL_USER };
            Message::new(
                format!("seed-{}", i),
                conversation_id.clone(),
                sender,
                format!("Message number {}", i),
                Timestamp(start + i * 60_000),
            )
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    threadline::init();

    let settings = match std::env::args().nth(1) {
        Some(path) => EngineSettings::load(&path)
            .with_context(|| format!("Failed to load settings from {}", path))?,
        None => EngineSettings::default(),
    };
    info!("Using settings: {:?}", settings);

    let conversation_id = ConversationId::from("demo");
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(MemoryTransport::new(LOCAL_USER).with_echo(inbound_tx));
    transport
        .seed(conversation_id.clone(), seed_history(&conversation_id, 45))
        .await;

    let (sink, mut events) = ChannelSink::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("event: {:?}", event);
        }
    });

    let session = ConversationSession::new(
        LOCAL_USER,
        settings,
        Arc::new(SystemClock),
        Box::new(sink),
    );
    let (handle, task) = SessionDriver::spawn(session, Arc::clone(&transport), inbound_rx);

    handle.open(conversation_id.clone()).await?;
    handle
        .set_participants(vec![
            Participant::new(LOCAL_USER, "alice", "Alice"),
            Participant::new(PEER, "bob", "Bob"),
        ])
        .await?;

    handle.input(true).await?;
    handle.send(OutgoingPayload::text("Hello from the demo")).await?;
    handle.load_older().await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let snapshot = handle.snapshot().await?;
    info!(
        "Loaded {} entries, {} unread, more history: {}",
        snapshot.entries.len(),
        snapshot.unread,
        snapshot.cursor.is_some_and(|cursor| cursor.has_more_older)
    );
    println!(
        "Typing signals forwarded: {:?}",
        transport.typing_signals().await
    );

    handle.close().await?;
    handle.shutdown().await?;
    let session = task.await.context("Session driver panicked")?;
    info!("Final status: {:?}", session.status());

    drop(session);
    printer.await.context("Event printer panicked")?;
    Ok(())
}
