//! Read receipt tracking
//!
//! The tracker keeps the local user's read position for one conversation.
//! Marks are monotonic: an acknowledgement for an older message never moves
//! the position backwards, and only one mark request is in flight at a time.

use crate::model::{ConversationId, Message, MessageId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, trace};

/// A read position
///
/// Message ids are opaque, so the creation time travels with the id to give
/// positions a recency order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadMarker {
    /// Last message read
    pub message_id: MessageId,
    /// Creation time of that message
    pub created_at: Timestamp,
}

impl ReadMarker {
    /// Create a marker
    pub fn new(message_id: impl Into<MessageId>, created_at: Timestamp) -> Self {
        Self {
            message_id: message_id.into(),
            created_at,
        }
    }

    /// Marker pointing at `message`
    pub fn for_message(message: &Message) -> Self {
        Self::new(message.id.clone(), message.created_at)
    }

    /// Whether `message` comes after this position
    pub fn is_before(&self, message: &Message) -> bool {
        (self.created_at, self.message_id.as_str()) < message.sort_key()
    }
}

impl PartialOrd for ReadMarker {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadMarker {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.created_at, &self.message_id).cmp(&(other.created_at, &other.message_id))
    }
}

/// Request descriptor for the transport's mark-read call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReadRequest {
    /// Conversation being marked
    pub conversation_id: ConversationId,
    /// Position to mark read
    pub up_to: ReadMarker,
    /// Session generation that issued the request (0 outside a session)
    #[serde(default)]
    pub generation: u64,
}

/// Read state of one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadState {
    /// Conversation the state belongs to
    pub conversation_id: ConversationId,
    /// Last acknowledged read position
    pub last_read: Option<ReadMarker>,
    /// Whether a mark request is outstanding
    pub mark_in_flight: bool,
    /// When the last acknowledgement was applied
    pub last_marked_at: Option<Timestamp>,
}

impl ReadState {
    /// Id of the last acknowledged message
    pub fn last_read_message_id(&self) -> Option<&MessageId> {
        self.last_read.as_ref().map(|marker| &marker.message_id)
    }
}

/// De-duplicating, monotonic mark-read tracker
#[derive(Debug, Clone)]
pub struct ReadReceiptTracker {
    state: ReadState,
}

impl ReadReceiptTracker {
    /// Create a tracker with nothing read
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            state: ReadState {
                conversation_id,
                last_read: None,
                mark_in_flight: false,
                last_marked_at: None,
            },
        }
    }

    /// Current read state
    pub fn state(&self) -> &ReadState {
        &self.state
    }

    /// Last acknowledged position
    pub fn last_read(&self) -> Option<&ReadMarker> {
        self.state.last_read.as_ref()
    }

    /// Ask to mark everything up to `up_to` as read
    ///
    /// Returns `None` when a request is already in flight or `up_to` is not
    /// newer than the acknowledged position.
    pub fn mark_read(&mut self, up_to: ReadMarker) -> Option<MarkReadRequest> {
        if self.state.mark_in_flight {
            trace!("Mark read for {} skipped: request in flight", self.state.conversation_id);
            return None;
        }
        if self.state.last_read.as_ref().is_some_and(|current| &up_to <= current) {
            trace!("Mark read for {} skipped: already read", self.state.conversation_id);
            return None;
        }

        self.state.mark_in_flight = true;
        debug!("Marking {} read up to {}", self.state.conversation_id, up_to.message_id);
        Some(MarkReadRequest {
            conversation_id: self.state.conversation_id.clone(),
            up_to,
            generation: 0,
        })
    }

    /// Apply a successful mark-read acknowledgement
    ///
    /// Returns true when the read position moved forward.
    pub fn complete_mark(&mut self, up_to: ReadMarker, at: Timestamp) -> bool {
        self.state.mark_in_flight = false;
        self.advance(up_to, at)
    }

    /// Forget the in-flight request; the caller may try again
    pub fn fail_mark(&mut self) {
        self.state.mark_in_flight = false;
    }

    /// Apply a read position acknowledged elsewhere (another device)
    ///
    /// Leaves any in-flight request untouched.
    pub fn apply_remote_ack(&mut self, up_to: ReadMarker, at: Timestamp) -> bool {
        self.advance(up_to, at)
    }

    fn advance(&mut self, up_to: ReadMarker, at: Timestamp) -> bool {
        self.state.last_marked_at = Some(at);
        match &self.state.last_read {
            Some(current) if &up_to <= current => false,
            _ => {
                self.state.last_read = Some(up_to);
                true
            }
        }
    }
}
