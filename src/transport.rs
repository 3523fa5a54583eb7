//! Transport contract
//!
//! The engine never talks to the network. It produces request descriptors
//! (`OutboundSend`, `FetchOlderRequest`, `MarkReadRequest`) and a
//! `Transport` implementation executes them. Server-pushed traffic arrives as
//! a stream of `InboundEvent`s.
//!
//! Implementations decode and validate wire payloads before handing values
//! to the engine. Inbound messages should carry the correlation id of the
//! send that produced them; without it the store falls back to content
//! matching.
//!
//! `MemoryTransport` is an in-process implementation backed by plain vectors,
//! used by the demo binary and the driver tests.

use crate::events::FailureKind;
use crate::model::{
    ClientTempId, ConversationId, Message, MessageId, OutgoingPayload, Page, Timestamp, UserId,
};
use crate::pagination::FetchOlderRequest;
use crate::presence::TypingSignal;
use crate::receipts::MarkReadRequest;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

/// Request descriptor for sending one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSend {
    /// Target conversation
    pub conversation_id: ConversationId,
    /// Correlation key to echo back on the confirmed message
    pub client_temp_id: ClientTempId,
    /// Content to send
    pub payload: OutgoingPayload,
    /// Session generation that issued the send
    pub generation: u64,
}

/// Server-pushed traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A message was posted to a conversation
    NewMessage {
        /// The confirmed message
        message: Message,
        /// Temp id of the local send that produced it, when known
        correlation: Option<ClientTempId>,
    },
    /// A participant started or stopped typing
    Typing {
        /// Conversation the signal belongs to
        conversation_id: ConversationId,
        /// Who is typing
        user_id: UserId,
        /// Started (true) or stopped (false)
        is_typing: bool,
    },
    /// Someone read a conversation up to a message
    ReadAck {
        /// Conversation that was read
        conversation_id: ConversationId,
        /// Who read it
        reader: UserId,
        /// Last message read
        up_to: MessageId,
        /// When it was read
        at: Timestamp,
    },
    /// A participant's online status changed
    Presence {
        /// Participant
        user_id: UserId,
        /// Whether they are online
        is_online: bool,
        /// Last time seen, when the server reports it
        last_seen_at: Option<Timestamp>,
    },
    /// The transport connected or lost its connection
    Connection {
        /// Current connection status
        connected: bool,
    },
}

/// Capability contract the engine's host executes requests against
pub trait Transport: Send + Sync + 'static {
    /// Deliver a message; resolves to the server-confirmed message
    fn send(&self, request: OutboundSend) -> impl Future<Output = Result<Message>> + Send;

    /// Fetch one page of history older than `request.before`
    fn fetch_older(
        &self,
        request: FetchOlderRequest,
    ) -> impl Future<Output = Result<Page<Message>>> + Send;

    /// Mark a conversation read; resolves to the server's acknowledgement time
    fn mark_read(&self, request: MarkReadRequest) -> impl Future<Output = Result<Timestamp>> + Send;

    /// Forward a local typing signal
    fn send_typing(
        &self,
        conversation_id: ConversationId,
        signal: TypingSignal,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// In-process transport backed by vectors
///
/// Sent messages are stored per conversation, get sequential ids (`srv-1`,
/// `srv-2`, ...) and are echoed to the inbound channel when one is attached.
/// Each operation can be switched into failure mode and delayed by a fixed
/// latency.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    local_user: UserId,
    history: Arc<Mutex<HashMap<ConversationId, Vec<Message>>>>,
    next_id: Arc<AtomicU64>,
    failing: Arc<Mutex<HashSet<FailureKind>>>,
    typing_log: Arc<Mutex<Vec<(ConversationId, TypingSignal)>>>,
    echo: Option<mpsc::UnboundedSender<InboundEvent>>,
    latency: Duration,
}

impl MemoryTransport {
    /// Create a transport sending as `local_user`
    pub fn new(local_user: impl Into<UserId>) -> Self {
        Self {
            local_user: local_user.into(),
            history: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            failing: Arc::new(Mutex::new(HashSet::new())),
            typing_log: Arc::new(Mutex::new(Vec::new())),
            echo: None,
            latency: Duration::ZERO,
        }
    }

    /// Echo every accepted send to `inbound`, as a server broadcast would
    pub fn with_echo(mut self, inbound: mpsc::UnboundedSender<InboundEvent>) -> Self {
        self.echo = Some(inbound);
        self
    }

    /// Delay every send, fetch and mark-read by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seed server-side history for a conversation
    pub async fn seed(&self, conversation_id: ConversationId, mut messages: Vec<Message>) {
        messages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        self.history.lock().await.insert(conversation_id, messages);
    }

    /// Make an operation fail (or succeed again)
    pub async fn set_failing(&self, kind: FailureKind, failing: bool) {
        let mut guard = self.failing.lock().await;
        if failing {
            guard.insert(kind);
        } else {
            guard.remove(&kind);
        }
    }

    /// Typing signals received so far
    pub async fn typing_signals(&self) -> Vec<(ConversationId, TypingSignal)> {
        self.typing_log.lock().await.clone()
    }

    /// Number of messages stored for a conversation
    pub async fn stored_count(&self, conversation_id: &ConversationId) -> usize {
        self.history
            .lock()
            .await
            .get(conversation_id)
            .map_or(0, Vec::len)
    }

    async fn check(&self, kind: FailureKind) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.lock().await.contains(&kind) {
            return Err(Error::Transport(format!("{:?} unavailable", kind)));
        }
        Ok(())
    }
}

impl Transport for MemoryTransport {
    async fn send(&self, request: OutboundSend) -> Result<Message> {
        self.check(FailureKind::Send).await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut message = Message::new(
            format!("srv-{}", id),
            request.conversation_id.clone(),
            self.local_user.clone(),
            request.payload.content,
            Timestamp::now(),
        )
        .with_type(request.payload.message_type)
        .with_client_temp_id(request.client_temp_id.clone());
        message.attachment = request.payload.attachment;

        self.history
            .lock()
            .await
            .entry(request.conversation_id)
            .or_default()
            .push(message.clone());

        if let Some(echo) = &self.echo {
            let _ = echo.send(InboundEvent::NewMessage {
                message: message.clone(),
                correlation: Some(request.client_temp_id),
            });
        }

        debug!("Memory transport accepted {}", message.id);
        Ok(message)
    }

    async fn fetch_older(&self, request: FetchOlderRequest) -> Result<Page<Message>> {
        self.check(FailureKind::FetchOlder).await?;

        let history = self.history.lock().await;
        let older: Vec<&Message> = history
            .get(&request.conversation_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|message| request.before.is_none_or(|before| message.created_at < before))
                    .collect()
            })
            .unwrap_or_default();

        let start = older.len().saturating_sub(request.page_size as usize);
        let items: Vec<Message> = older[start..].iter().map(|message| (*message).clone()).collect();
        Ok(Page::new(items, start == 0))
    }

    async fn mark_read(&self, request: MarkReadRequest) -> Result<Timestamp> {
        self.check(FailureKind::MarkRead).await?;
        info!(
            "Memory transport marked {} read up to {}",
            request.conversation_id, request.up_to.message_id
        );
        Ok(Timestamp::now())
    }

    async fn send_typing(&self, conversation_id: ConversationId, signal: TypingSignal) -> Result<()> {
        self.typing_log.lock().await.push((conversation_id, signal));
        Ok(())
    }
}
