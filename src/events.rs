//! Session events and sinks
//!
//! Every observable state change of a `ConversationSession` is reported as a
//! `SessionEvent` through an `EventSink`. The presentation layer reacts to
//! them (scrolling, toasts, retry buttons) and tests assert on them instead
//! of scraping logs.
//!
//! Sinks provided here:
//! - `TracingSink` - logs every event through `tracing`
//! - `ChannelSink` - forwards events over a tokio channel
//! - `RecordingSink` - keeps events in memory for inspection

use crate::model::{ClientTempId, ConversationId, MessageId, UserId};
use crate::presence::TypingSignal;
use crate::receipts::ReadMarker;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Which outbound operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Sending a message
    Send,
    /// Fetching older history
    FetchOlder,
    /// Marking the conversation read
    MarkRead,
}

/// Observable change of the active conversation
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A conversation became the active one
    Opened {
        /// Conversation opened
        conversation_id: ConversationId,
    },
    /// The active conversation was minimized
    Minimized {
        /// Conversation minimized
        conversation_id: ConversationId,
    },
    /// The active conversation was restored from minimized
    Restored {
        /// Conversation restored
        conversation_id: ConversationId,
    },
    /// The active conversation was closed and its state discarded
    Closed {
        /// Conversation closed
        conversation_id: ConversationId,
    },
    /// A message was inserted into the log
    MessageInserted {
        /// Inserted message
        message_id: MessageId,
        /// Position in the log
        index: usize,
    },
    /// An optimistic entry was replaced by its confirmed message
    MessageReconciled {
        /// Correlation key of the retired entry
        client_temp_id: ClientTempId,
        /// Confirmed message id
        message_id: MessageId,
        /// Position in the log
        index: usize,
    },
    /// An optimistic entry was added at the tail
    SendQueued {
        /// Correlation key for the transport
        client_temp_id: ClientTempId,
    },
    /// A failed optimistic entry was removed
    SendDiscarded {
        /// Correlation key of the removed entry
        client_temp_id: ClientTempId,
    },
    /// A history page was spliced in at the head
    ///
    /// The view must apply its scroll-anchor adjustment for this splice and
    /// must not auto-scroll.
    HistoryPrepended {
        /// Messages added
        inserted: usize,
        /// Whether more history can be requested
        has_more_older: bool,
    },
    /// The view should jump to the newest message
    ScrollToBottom,
    /// The local typing state changed; forward to the transport
    LocalTyping(TypingSignal),
    /// The set of remote typers changed
    RemoteTypersChanged {
        /// Everyone currently typing
        typers: Vec<UserId>,
    },
    /// The local read position moved forward
    ReadAdvanced {
        /// New read position
        up_to: ReadMarker,
    },
    /// The other side read own messages
    PeerRead {
        /// Last message they read
        up_to: MessageId,
        /// Own messages newly marked read
        updated: usize,
    },
    /// Number of unread messages changed
    UnreadChanged {
        /// Unread messages from other participants
        count: usize,
    },
    /// A participant's online status changed
    ParticipantPresence {
        /// Participant
        user_id: UserId,
        /// New status
        is_online: bool,
    },
    /// Transport connectivity changed
    ConnectionChanged {
        /// Whether the transport is connected
        connected: bool,
    },
    /// An outbound operation failed; the UI may offer a retry
    TransportFailure {
        /// Operation that failed
        kind: FailureKind,
        /// Affected optimistic send, for `FailureKind::Send`
        client_temp_id: Option<ClientTempId>,
        /// Transport's description
        reason: String,
    },
}

/// Receiver of session events
pub trait EventSink: Send {
    /// Handle one event
    fn emit(&mut self, event: SessionEvent);
}

/// Logs events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&mut self, event: SessionEvent) {
        match &event {
            SessionEvent::TransportFailure { kind, reason, .. } => {
                warn!("Transport failure ({:?}): {}", kind, reason);
            }
            SessionEvent::Opened { conversation_id } => {
                info!("Conversation {} opened", conversation_id);
            }
            SessionEvent::Closed { conversation_id } => {
                info!("Conversation {} closed", conversation_id);
            }
            _ => debug!("Session event: {:?}", event),
        }
    }
}

/// Forwards events to an unbounded tokio channel
///
/// Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving half
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!("Session event dropped: receiver closed");
        }
    }
}

/// Keeps every event in memory
///
/// Clones share the same buffer, so a test can keep one handle while the
/// session owns the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl RecordingSink {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all recorded events
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return all recorded events
    pub fn take(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: SessionEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
