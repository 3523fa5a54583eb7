//! Per-conversation message log
//!
//! This module owns the ordered list the presentation layer renders:
//! - Confirmed messages kept in chronological order
//! - Optimistic (pending) sends shown before the server confirms them
//! - Reconciliation of pending entries with their confirmed counterparts
//! - De-duplication of messages seen through both history and the live stream
//!
//! Entries are ordered by `created_at`. Equal timestamps are ordered
//! confirmed-before-pending, confirmed entries by id and pending entries by
//! allocation order.

use crate::model::{
    ClientTempId, ConversationId, Message, MessageId, OutgoingPayload, Timestamp, UserId,
};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, trace, warn};

/// Lifecycle of an optimistic send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendState {
    /// Waiting for the transport
    Pending,
    /// Server accepted it; the entry is about to be replaced
    Confirmed,
    /// Transport reported a failure; kept visible for retry or delete
    Failed {
        /// Failure description from the transport
        reason: String,
    },
}

/// A locally authored message that has not been confirmed yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    /// Correlation key handed to the transport
    pub client_temp_id: ClientTempId,
    /// What the user asked to send
    pub payload: OutgoingPayload,
    /// Number of send attempts so far (starts at 1)
    pub attempt: u32,
    /// Current state
    pub state: SendState,
    /// Local creation time, clamped so the log never runs backwards
    pub created_at: Timestamp,
    seq: u64,
}

impl PendingSend {
    /// Whether the last attempt failed
    pub fn is_failed(&self) -> bool {
        matches!(self.state, SendState::Failed { .. })
    }
}

/// One row of the conversation log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// Server-confirmed message
    Confirmed(Message),
    /// Optimistic entry awaiting confirmation
    Pending(PendingSend),
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Tiebreak<'a> {
    Confirmed(&'a str),
    Pending(u64),
}

type EntryKey<'a> = (Timestamp, Tiebreak<'a>);

impl LogEntry {
    /// Creation time used for ordering
    pub fn created_at(&self) -> Timestamp {
        match self {
            LogEntry::Confirmed(message) => message.created_at,
            LogEntry::Pending(pending) => pending.created_at,
        }
    }

    /// The confirmed message, if this entry is confirmed
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            LogEntry::Confirmed(message) => Some(message),
            LogEntry::Pending(_) => None,
        }
    }

    /// The pending record, if this entry is still optimistic
    pub fn as_pending(&self) -> Option<&PendingSend> {
        match self {
            LogEntry::Confirmed(_) => None,
            LogEntry::Pending(pending) => Some(pending),
        }
    }

    /// Whether this entry is an unconfirmed local send
    pub fn is_pending(&self) -> bool {
        matches!(self, LogEntry::Pending(_))
    }

    /// Message body, regardless of confirmation state
    pub fn content(&self) -> &str {
        match self {
            LogEntry::Confirmed(message) => &message.content,
            LogEntry::Pending(pending) => &pending.payload.content,
        }
    }

    fn key(&self) -> EntryKey<'_> {
        match self {
            LogEntry::Confirmed(message) => {
                (message.created_at, Tiebreak::Confirmed(message.id.as_str()))
            }
            LogEntry::Pending(pending) => (pending.created_at, Tiebreak::Pending(pending.seq)),
        }
    }
}

fn message_key(message: &Message) -> EntryKey<'_> {
    (message.created_at, Tiebreak::Confirmed(message.id.as_str()))
}

/// Result of feeding a live message into the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// New message inserted at `index`
    Inserted {
        /// Position in the log
        index: usize,
    },
    /// A pending entry was replaced by this message
    Reconciled {
        /// Position in the log after replacement
        index: usize,
        /// Correlation key of the replaced entry
        client_temp_id: ClientTempId,
    },
    /// The message id was already present; nothing changed
    Duplicate,
}

/// Result of confirming an optimistic send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The pending entry was replaced by the confirmed message
    Confirmed {
        /// Position in the log after replacement
        index: usize,
        /// The retired pending record (state `Confirmed`)
        retired: PendingSend,
    },
    /// The confirmed id already arrived through the live stream; the pending
    /// entry was dropped instead of creating a duplicate
    AlreadyPresent,
    /// No pending entry carries this temp id
    Unknown,
}

/// Result of splicing a history page into the log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrependOutcome {
    /// Messages added to the log
    pub inserted: usize,
    /// Messages skipped because their id was already present
    pub duplicates: usize,
    /// Messages that replaced a pending entry carrying the same temp id
    pub reconciled: usize,
}

/// Ordered, de-duplicated message log for one conversation
#[derive(Debug, Clone)]
pub struct MessageStore {
    conversation_id: ConversationId,
    local_user: UserId,
    entries: Vec<LogEntry>,
    confirmed_ids: HashSet<MessageId>,
    temp_nonce: String,
    next_seq: u64,
    reconcile_window_ms: Option<u64>,
}

impl MessageStore {
    /// Create an empty store
    ///
    /// `reconcile_window_ms` enables the content heuristic for incoming
    /// messages without a correlation id; `None` disables it.
    pub fn new(
        conversation_id: ConversationId,
        local_user: UserId,
        reconcile_window_ms: Option<u64>,
    ) -> Self {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        Self {
            conversation_id,
            local_user,
            entries: Vec::new(),
            confirmed_ids: HashSet::new(),
            temp_nonce: nonce[..12].to_string(),
            next_seq: 0,
            reconcile_window_ms,
        }
    }

    /// Conversation this log belongs to
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// All entries in display order
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Confirmed messages in display order
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().filter_map(LogEntry::as_message)
    }

    /// Number of entries, pending included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a confirmed message with this id is present
    pub fn contains(&self, id: &MessageId) -> bool {
        self.confirmed_ids.contains(id)
    }

    /// Look up a confirmed message
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages().find(|message| &message.id == id)
    }

    /// Look up a pending send
    pub fn pending(&self, client_temp_id: &ClientTempId) -> Option<&PendingSend> {
        self.pending_index(client_temp_id)
            .and_then(|index| self.entries[index].as_pending())
    }

    /// Number of unconfirmed entries (pending or failed)
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_pending()).count()
    }

    /// Most recent confirmed message
    pub fn latest_confirmed(&self) -> Option<&Message> {
        self.entries.iter().rev().find_map(LogEntry::as_message)
    }

    /// Creation time of the oldest confirmed message
    pub fn oldest_confirmed_at(&self) -> Option<Timestamp> {
        self.messages().next().map(|message| message.created_at)
    }

    /// Insert a confirmed message from the live stream
    ///
    /// `correlation` is the temp id the transport associated with this
    /// message; the message's own `client_temp_id` is used when absent.
    pub fn append_incoming(
        &mut self,
        mut message: Message,
        correlation: Option<ClientTempId>,
    ) -> AppendOutcome {
        let correlation = correlation.or_else(|| message.client_temp_id.clone());

        if self.confirmed_ids.contains(&message.id) {
            // A pending twin cannot survive next to its confirmed message
            if let Some(temp_id) = &correlation {
                if let Some(index) = self.pending_index(temp_id) {
                    self.entries.remove(index);
                    debug!("Dropped pending {} shadowed by {}", temp_id, message.id);
                }
            }
            trace!("Duplicate incoming message {}", message.id);
            return AppendOutcome::Duplicate;
        }

        let matched = match &correlation {
            Some(temp_id) => self.pending_index(temp_id),
            None => self.heuristic_match(&message),
        };

        let matched = matched.and_then(|index| {
            self.entries[index]
                .as_pending()
                .map(|pending| (index, pending.client_temp_id.clone()))
        });

        if let Some((index, client_temp_id)) = matched {
            message.client_temp_id = Some(client_temp_id.clone());
            let index = self.replace_pending(index, message);
            debug!(
                "Reconciled pending {} in {} at position {}",
                client_temp_id, self.conversation_id, index
            );
            return AppendOutcome::Reconciled {
                index,
                client_temp_id,
            };
        }

        let index = self.insert_sorted(message);
        AppendOutcome::Inserted { index }
    }

    /// Show a locally authored message immediately
    ///
    /// Returns the correlation key the caller must pass to the transport.
    pub fn send_optimistic(&mut self, payload: OutgoingPayload, now: Timestamp) -> ClientTempId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let client_temp_id = ClientTempId::new(format!("tmp-{}-{}", self.temp_nonce, seq));

        // Never let the tail run backwards when the local clock lags the server
        let created_at = self
            .entries
            .last()
            .map(|last| last.created_at().max(now))
            .unwrap_or(now);

        self.entries.push(LogEntry::Pending(PendingSend {
            client_temp_id: client_temp_id.clone(),
            payload,
            attempt: 1,
            state: SendState::Pending,
            created_at,
            seq,
        }));

        debug!("Queued optimistic send {} in {}", client_temp_id, self.conversation_id);
        client_temp_id
    }

    /// Replace a pending entry with its server-confirmed message
    pub fn confirm_send(
        &mut self,
        client_temp_id: &ClientTempId,
        mut message: Message,
    ) -> ConfirmOutcome {
        let Some(index) = self.pending_index(client_temp_id) else {
            debug!(
                "Confirmation for unknown send {} ignored (already reconciled?)",
                client_temp_id
            );
            return ConfirmOutcome::Unknown;
        };
        let Some(mut retired) = self.entries[index].as_pending().cloned() else {
            return ConfirmOutcome::Unknown;
        };

        if self.confirmed_ids.contains(&message.id) {
            self.entries.remove(index);
            debug!(
                "Send {} confirmed as {} which already arrived; dropped pending entry",
                client_temp_id, message.id
            );
            return ConfirmOutcome::AlreadyPresent;
        }

        retired.state = SendState::Confirmed;

        message.client_temp_id = Some(client_temp_id.clone());
        let index = self.replace_pending(index, message);
        debug!("Confirmed send {} at position {}", client_temp_id, index);
        ConfirmOutcome::Confirmed { index, retired }
    }

    /// Mark a pending send as failed
    ///
    /// The entry stays in the log until `discard_failed` is called.
    /// Returns false when the temp id is unknown.
    pub fn fail_send(&mut self, client_temp_id: &ClientTempId, reason: impl Into<String>) -> bool {
        let Some(pending) = self.pending_mut(client_temp_id) else {
            debug!("Failure for unknown send {} ignored", client_temp_id);
            return false;
        };
        let reason = reason.into();
        warn!("Send {} failed: {}", client_temp_id, reason);
        pending.state = SendState::Failed { reason };
        true
    }

    /// Put a failed send back into the pending state for another attempt
    ///
    /// Returns the payload to hand to the transport again, or `None` when the
    /// temp id is unknown or the send has not failed.
    pub fn retry_failed(&mut self, client_temp_id: &ClientTempId) -> Option<OutgoingPayload> {
        let pending = self.pending_mut(client_temp_id)?;
        if !pending.is_failed() {
            return None;
        }
        pending.attempt += 1;
        pending.state = SendState::Pending;
        debug!("Retrying send {} (attempt {})", client_temp_id, pending.attempt);
        Some(pending.payload.clone())
    }

    /// Remove a failed send from the log
    ///
    /// Sends still in flight are left alone.
    pub fn discard_failed(&mut self, client_temp_id: &ClientTempId) -> bool {
        match self.pending_index(client_temp_id) {
            Some(index) if self.entries[index].as_pending().is_some_and(PendingSend::is_failed) => {
                self.entries.remove(index);
                debug!("Discarded failed send {}", client_temp_id);
                true
            }
            _ => false,
        }
    }

    /// Splice a page of older history into the log
    ///
    /// `older` is expected in ascending order. Ids already present are
    /// skipped. Anything not older than the current head is merged into its
    /// chronological position instead of being stacked on top.
    pub fn prepend_history(&mut self, older: Vec<Message>) -> PrependOutcome {
        let mut outcome = PrependOutcome::default();
        let mut seen = HashSet::new();
        let mut block = Vec::with_capacity(older.len());
        let mut overlapping = Vec::new();

        for message in older {
            if self.confirmed_ids.contains(&message.id) || !seen.insert(message.id.clone()) {
                outcome.duplicates += 1;
                continue;
            }

            let pending_twin = message
                .client_temp_id
                .as_ref()
                .and_then(|temp_id| self.pending_index(temp_id));
            if let Some(index) = pending_twin {
                self.replace_pending(index, message);
                outcome.reconciled += 1;
                continue;
            }

            let before_head = self
                .entries
                .first()
                .is_none_or(|head| message_key(&message) < head.key());
            if before_head {
                block.push(message);
            } else {
                overlapping.push(message);
            }
        }

        if !block.is_sorted_by(|a, b| message_key(a) <= message_key(b)) {
            warn!(
                "History page for {} arrived unsorted; sorting locally",
                self.conversation_id
            );
            block.sort_by(|a, b| message_key(a).cmp(&message_key(b)));
        }

        outcome.inserted = block.len() + overlapping.len();
        for message in &block {
            self.confirmed_ids.insert(message.id.clone());
        }
        self.entries
            .splice(0..0, block.into_iter().map(LogEntry::Confirmed));

        for message in overlapping {
            self.insert_sorted(message);
        }

        debug!(
            "Prepended {} messages to {} ({} duplicates, {} reconciled)",
            outcome.inserted, self.conversation_id, outcome.duplicates, outcome.reconciled
        );
        outcome
    }

    /// Record that the other side has read own messages up to `up_to`
    ///
    /// Returns how many messages got a new `read_at`.
    pub fn mark_read_by_peer(&mut self, up_to: &MessageId, at: Timestamp) -> usize {
        let Some(last) = self.position_of(up_to) else {
            trace!("Peer read ack for unknown message {}", up_to);
            return 0;
        };

        let local_user = &self.local_user;
        let mut updated = 0;
        for entry in &mut self.entries[..=last] {
            if let LogEntry::Confirmed(message) = entry {
                if message.is_from(local_user) && message.read_at.is_none() {
                    message.read_at = Some(at);
                    updated += 1;
                }
            }
        }
        updated
    }

    /// Position of a confirmed message in the log
    pub fn position_of(&self, id: &MessageId) -> Option<usize> {
        if !self.confirmed_ids.contains(id) {
            return None;
        }
        self.entries
            .iter()
            .position(|entry| entry.as_message().is_some_and(|message| &message.id == id))
    }

    fn pending_index(&self, client_temp_id: &ClientTempId) -> Option<usize> {
        self.entries.iter().position(|entry| {
            entry
                .as_pending()
                .is_some_and(|pending| &pending.client_temp_id == client_temp_id)
        })
    }

    fn pending_mut(&mut self, client_temp_id: &ClientTempId) -> Option<&mut PendingSend> {
        self.entries.iter_mut().find_map(|entry| match entry {
            LogEntry::Pending(pending) if &pending.client_temp_id == client_temp_id => {
                Some(pending)
            }
            _ => None,
        })
    }

    fn heuristic_match(&self, message: &Message) -> Option<usize> {
        let window = self.reconcile_window_ms?;
        if !message.is_from(&self.local_user) {
            return None;
        }
        self.entries.iter().position(|entry| {
            entry.as_pending().is_some_and(|pending| {
                pending.payload.content == message.content
                    && pending.payload.message_type == message.message_type
                    && pending.created_at.abs_diff(message.created_at) <= window
            })
        })
    }

    /// Replace the pending entry at `index`, keeping its slot when the
    /// confirmed timestamp still fits between the neighbours
    fn replace_pending(&mut self, index: usize, message: Message) -> usize {
        let key = message_key(&message);
        let fits_before = index == 0 || self.entries[index - 1].key() <= key;
        let fits_after = index + 1 >= self.entries.len() || key <= self.entries[index + 1].key();

        if fits_before && fits_after {
            self.confirmed_ids.insert(message.id.clone());
            self.entries[index] = LogEntry::Confirmed(message);
            return index;
        }

        debug!(
            "Confirmed message {} moved out of its optimistic slot to keep order",
            message.id
        );
        self.entries.remove(index);
        self.insert_sorted(message)
    }

    fn insert_sorted(&mut self, message: Message) -> usize {
        let index = {
            let key = message_key(&message);
            self.entries
                .partition_point(|entry| entry.key().cmp(&key) != Ordering::Greater)
        };
        self.confirmed_ids.insert(message.id.clone());
        self.entries.insert(index, LogEntry::Confirmed(message));
        index
    }
}
