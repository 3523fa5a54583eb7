//! Conversation session orchestrator
//!
//! A `ConversationSession` binds the message store, pagination cursor,
//! presence debouncer and read receipt tracker to the one conversation that
//! is currently open. It owns their lifecycle:
//! - `open` builds fresh sub-state and issues the initial history fetch
//! - `minimize`/`restore` toggle visibility without dropping state
//! - `close` discards everything
//!
//! Outbound intents return request descriptors for the transport. Every
//! `open` starts a new generation and stamps it on the descriptors; a
//! completion is handed back together with its descriptor. A completion
//! whose conversation or generation is no longer open is a stale completion
//! and is dropped without an event, even when the same conversation has
//! been opened again since. Nothing here retries on its own.

use crate::clock::Clock;
use crate::events::{EventSink, FailureKind, SessionEvent};
use crate::model::{
    ClientTempId, ConversationId, Message, MessageId, OutgoingPayload, Page, Participant,
    Timestamp, UserId,
};
use crate::pagination::{Cursor, FetchOlderRequest, PaginationCursor};
use crate::presence::{PresenceDebouncer, TypingSignal, TypingState};
use crate::receipts::{MarkReadRequest, ReadMarker, ReadReceiptTracker, ReadState};
use crate::settings::EngineSettings;
use crate::store::{AppendOutcome, ConfirmOutcome, LogEntry, MessageStore, PrependOutcome};
use crate::transport::{InboundEvent, OutboundSend};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Lifecycle state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// No conversation is open
    Closed,
    /// A conversation is open and visible
    Open,
    /// A conversation is open but hidden
    Minimized,
}

/// Point-in-time copy of the session for rendering or inspection
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Lifecycle state
    pub status: SessionStatus,
    /// Open conversation, if any
    pub conversation_id: Option<ConversationId>,
    /// Message log in display order
    pub entries: Vec<LogEntry>,
    /// Pagination state
    pub cursor: Option<Cursor>,
    /// Typing state
    pub typing: Option<TypingState>,
    /// Read state
    pub read: Option<ReadState>,
    /// Unread messages from other participants
    pub unread: usize,
    /// Transport connectivity
    pub connected: bool,
}

/// Sub-state of the open conversation
#[derive(Debug)]
struct ActiveConversation {
    conversation_id: ConversationId,
    generation: u64,
    store: MessageStore,
    cursor: PaginationCursor,
    presence: PresenceDebouncer,
    receipts: ReadReceiptTracker,
    participants: HashMap<UserId, Participant>,
    minimized: bool,
    unread: usize,
}

impl ActiveConversation {
    fn new(
        conversation_id: ConversationId,
        generation: u64,
        local_user: &UserId,
        settings: &EngineSettings,
    ) -> Self {
        let window = settings
            .heuristic_reconcile
            .then_some(settings.reconcile_window_ms);
        Self {
            store: MessageStore::new(conversation_id.clone(), local_user.clone(), window),
            cursor: PaginationCursor::new(conversation_id.clone(), settings.page_size),
            presence: PresenceDebouncer::new(conversation_id.clone(), settings.typing_idle_ms),
            receipts: ReadReceiptTracker::new(conversation_id.clone()),
            participants: HashMap::new(),
            minimized: false,
            unread: 0,
            conversation_id,
            generation,
        }
    }

    fn count_unread(&self, local_user: &UserId) -> usize {
        let last_read = self.receipts.last_read();
        self.store
            .messages()
            .filter(|message| !message.is_from(local_user))
            .filter(|message| last_read.is_none_or(|marker| marker.is_before(message)))
            .count()
    }

    /// Recount unread messages; returns the new count when it changed
    fn refresh_unread(&mut self, local_user: &UserId) -> Option<usize> {
        let count = self.count_unread(local_user);
        if count == self.unread {
            return None;
        }
        self.unread = count;
        Some(count)
    }

    fn typers(&self) -> Vec<UserId> {
        self.presence.remote_typers().cloned().collect()
    }

    fn request_older(&mut self) -> Option<FetchOlderRequest> {
        let request = self.cursor.request_older()?;
        Some(FetchOlderRequest {
            generation: self.generation,
            ..request
        })
    }

    fn mark_latest_read(&mut self) -> Option<MarkReadRequest> {
        let marker = ReadMarker::for_message(self.store.latest_confirmed()?);
        let request = self.receipts.mark_read(marker)?;
        Some(MarkReadRequest {
            generation: self.generation,
            ..request
        })
    }
}

/// Pick the active conversation if a completion belongs to it
fn matching<'a>(
    active: &'a mut Option<ActiveConversation>,
    conversation_id: &ConversationId,
    generation: u64,
    operation: &str,
) -> Option<&'a mut ActiveConversation> {
    match active {
        Some(active)
            if &active.conversation_id == conversation_id && active.generation == generation =>
        {
            Some(active)
        }
        _ => {
            debug!(
                "Stale {} for {} (generation {}) ignored",
                operation, conversation_id, generation
            );
            None
        }
    }
}

/// Pick the active conversation if server-pushed traffic is addressed to it
fn addressed<'a>(
    active: &'a mut Option<ActiveConversation>,
    conversation_id: &ConversationId,
    what: &str,
) -> Option<&'a mut ActiveConversation> {
    match active {
        Some(active) if &active.conversation_id == conversation_id => Some(active),
        _ => {
            debug!("Ignoring {} for {}", what, conversation_id);
            None
        }
    }
}

/// Orchestrator for the single open conversation
pub struct ConversationSession {
    local_user: UserId,
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
    sink: Box<dyn EventSink>,
    active: Option<ActiveConversation>,
    generation: u64,
    connected: bool,
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("local_user", &self.local_user)
            .field("settings", &self.settings)
            .field("active", &self.active)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl ConversationSession {
    /// Create a closed session for `local_user`
    pub fn new(
        local_user: impl Into<UserId>,
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        Self {
            local_user: local_user.into(),
            settings,
            clock,
            sink,
            active: None,
            generation: 0,
            connected: true,
        }
    }

    /// The local user's id
    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    /// Settings the session was built with
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Lifecycle state
    pub fn status(&self) -> SessionStatus {
        match &self.active {
            None => SessionStatus::Closed,
            Some(active) if active.minimized => SessionStatus::Minimized,
            Some(_) => SessionStatus::Open,
        }
    }

    /// Whether a conversation is open and not minimized
    pub fn is_visible(&self) -> bool {
        self.status() == SessionStatus::Open
    }

    /// Open conversation id
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.active.as_ref().map(|active| &active.conversation_id)
    }

    /// Message log of the open conversation
    pub fn store(&self) -> Option<&MessageStore> {
        self.active.as_ref().map(|active| &active.store)
    }

    /// Pagination cursor of the open conversation
    pub fn cursor(&self) -> Option<&Cursor> {
        self.active.as_ref().map(|active| active.cursor.cursor())
    }

    /// Typing state of the open conversation
    pub fn typing_state(&self) -> Option<&TypingState> {
        self.active.as_ref().map(|active| active.presence.state())
    }

    /// Read state of the open conversation
    pub fn read_state(&self) -> Option<&ReadState> {
        self.active.as_ref().map(|active| active.receipts.state())
    }

    /// Known participant of the open conversation
    pub fn participant(&self, user_id: &UserId) -> Option<&Participant> {
        self.active.as_ref()?.participants.get(user_id)
    }

    /// Unread messages from other participants
    pub fn unread_count(&self) -> usize {
        self.active.as_ref().map_or(0, |active| active.unread)
    }

    /// Whether the transport reported itself connected
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether the local user authored `message`
    pub fn is_own(&self, message: &Message) -> bool {
        message.is_from(&self.local_user)
    }

    /// Copy the observable state
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status(),
            conversation_id: self.conversation_id().cloned(),
            entries: self
                .store()
                .map(|store| store.entries().to_vec())
                .unwrap_or_default(),
            cursor: self.cursor().cloned(),
            typing: self.typing_state().cloned(),
            read: self.read_state().cloned(),
            unread: self.unread_count(),
            connected: self.connected,
        }
    }

    /// Make `conversation_id` the open conversation
    ///
    /// A different open conversation is discarded first. Returns the initial
    /// history fetch. Opening the conversation that is already open keeps
    /// its state and returns `None`; use `restore` to un-minimize it.
    pub fn open(&mut self, conversation_id: impl Into<ConversationId>) -> Option<FetchOlderRequest> {
        let conversation_id = conversation_id.into();
        if self.conversation_id() == Some(&conversation_id) {
            debug!("Conversation {} already open", conversation_id);
            return None;
        }

        self.discard_active();

        self.generation += 1;
        let mut active = ActiveConversation::new(
            conversation_id.clone(),
            self.generation,
            &self.local_user,
            &self.settings,
        );
        let request = active.request_older();
        self.active = Some(active);

        info!(
            "Opened conversation {} (generation {})",
            conversation_id, self.generation
        );
        self.sink.emit(SessionEvent::Opened { conversation_id });
        request
    }

    /// Hide the open conversation, keeping its state
    ///
    /// Losing visibility ends local typing.
    pub fn minimize(&mut self) -> bool {
        let Some(active) = self.active.as_mut().filter(|active| !active.minimized) else {
            return false;
        };
        active.minimized = true;
        let stop = active.presence.on_send_or_blur();
        let conversation_id = active.conversation_id.clone();

        if let Some(signal) = stop {
            self.sink.emit(SessionEvent::LocalTyping(signal));
        }
        self.sink.emit(SessionEvent::Minimized { conversation_id });
        true
    }

    /// Show a minimized conversation again
    ///
    /// Returns a mark-read request for the latest message when there are
    /// unread messages.
    pub fn restore(&mut self) -> Option<MarkReadRequest> {
        let active = self.active.as_mut().filter(|active| active.minimized)?;
        active.minimized = false;
        let conversation_id = active.conversation_id.clone();
        let has_unread = active.unread > 0;

        self.sink.emit(SessionEvent::Restored { conversation_id });
        if has_unread { self.mark_read() } else { None }
    }

    /// Close the open conversation and discard its state
    ///
    /// Sends still in flight resolve later as stale completions.
    pub fn close(&mut self) {
        self.discard_active();
    }

    /// Show a message optimistically and return the send descriptor
    pub fn send(&mut self, payload: OutgoingPayload) -> Option<OutboundSend> {
        let now = self.clock.now();
        let active = self.active.as_mut()?;

        let client_temp_id = active.store.send_optimistic(payload.clone(), now);
        let stop = active.presence.on_send_or_blur();
        let visible = !active.minimized;
        let conversation_id = active.conversation_id.clone();
        let generation = active.generation;

        if let Some(signal) = stop {
            self.sink.emit(SessionEvent::LocalTyping(signal));
        }
        self.sink.emit(SessionEvent::SendQueued {
            client_temp_id: client_temp_id.clone(),
        });
        if visible {
            self.sink.emit(SessionEvent::ScrollToBottom);
        }

        Some(OutboundSend {
            conversation_id,
            client_temp_id,
            payload,
            generation,
        })
    }

    /// Re-issue a failed send under the same temp id
    pub fn retry_send(&mut self, client_temp_id: &ClientTempId) -> Option<OutboundSend> {
        let active = self.active.as_mut()?;
        let payload = active.store.retry_failed(client_temp_id)?;
        Some(OutboundSend {
            conversation_id: active.conversation_id.clone(),
            client_temp_id: client_temp_id.clone(),
            payload,
            generation: active.generation,
        })
    }

    /// Remove a failed send from the log
    pub fn discard_failed(&mut self, client_temp_id: &ClientTempId) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        if !active.store.discard_failed(client_temp_id) {
            return false;
        }
        self.sink.emit(SessionEvent::SendDiscarded {
            client_temp_id: client_temp_id.clone(),
        });
        true
    }

    /// Apply a successful send
    ///
    /// Returns `None` for a stale completion.
    pub fn confirm_send(&mut self, request: &OutboundSend, message: Message) -> Option<ConfirmOutcome> {
        let client_temp_id = &request.client_temp_id;
        let active = matching(
            &mut self.active,
            &request.conversation_id,
            request.generation,
            "send confirmation",
        )?;
        let message_id = message.id.clone();
        let outcome = active.store.confirm_send(client_temp_id, message);

        let index = match &outcome {
            ConfirmOutcome::Confirmed { index, .. } => Some(*index),
            ConfirmOutcome::AlreadyPresent => active.store.position_of(&message_id),
            ConfirmOutcome::Unknown => None,
        };
        if let Some(index) = index {
            self.sink.emit(SessionEvent::MessageReconciled {
                client_temp_id: client_temp_id.clone(),
                message_id,
                index,
            });
        }
        Some(outcome)
    }

    /// Apply a failed send
    ///
    /// The entry stays visible as failed. Returns false for stale completions
    /// and unknown temp ids.
    pub fn fail_send(&mut self, request: &OutboundSend, reason: impl Into<String>) -> bool {
        let client_temp_id = &request.client_temp_id;
        let Some(active) = matching(
            &mut self.active,
            &request.conversation_id,
            request.generation,
            "send failure",
        ) else {
            return false;
        };
        let reason = reason.into();
        if !active.store.fail_send(client_temp_id, reason.clone()) {
            return false;
        }
        self.sink.emit(SessionEvent::TransportFailure {
            kind: FailureKind::Send,
            client_temp_id: Some(client_temp_id.clone()),
            reason,
        });
        true
    }

    /// Ask for the next page of older history
    pub fn load_older(&mut self) -> Option<FetchOlderRequest> {
        self.active.as_mut()?.request_older()
    }

    /// Apply a fetched history page
    ///
    /// The splice is reported as one `HistoryPrepended` event so the view can
    /// keep its scroll anchor. Only the very first page scrolls to the bottom.
    pub fn complete_older(
        &mut self,
        request: &FetchOlderRequest,
        page: Page<Message>,
    ) -> Option<PrependOutcome> {
        let active = matching(
            &mut self.active,
            &request.conversation_id,
            request.generation,
            "history page",
        )?;

        let advance = active.cursor.complete_older(&page);
        let outcome = active.store.prepend_history(page.items);
        let visible = !active.minimized;
        let unread = active.refresh_unread(&self.local_user);

        self.sink.emit(SessionEvent::HistoryPrepended {
            inserted: outcome.inserted,
            has_more_older: advance.has_more_older,
        });
        if advance.first_load && visible {
            self.sink.emit(SessionEvent::ScrollToBottom);
        }
        if let Some(count) = unread {
            self.sink.emit(SessionEvent::UnreadChanged { count });
        }
        Some(outcome)
    }

    /// Apply a failed history fetch; the page can be requested again
    pub fn fail_older(&mut self, request: &FetchOlderRequest, reason: impl Into<String>) {
        let Some(active) = matching(
            &mut self.active,
            &request.conversation_id,
            request.generation,
            "history failure",
        ) else {
            return;
        };
        active.cursor.fail_older();
        self.sink.emit(SessionEvent::TransportFailure {
            kind: FailureKind::FetchOlder,
            client_temp_id: None,
            reason: reason.into(),
        });
    }

    /// Register a change of the composer input
    pub fn input(&mut self, has_content: bool) -> Option<TypingSignal> {
        let now = self.clock.now();
        let signal = self.active.as_mut()?.presence.on_input(has_content, now)?;
        self.sink.emit(SessionEvent::LocalTyping(signal));
        Some(signal)
    }

    /// The composer lost focus
    pub fn blur(&mut self) -> Option<TypingSignal> {
        let signal = self.active.as_mut()?.presence.on_send_or_blur()?;
        self.sink.emit(SessionEvent::LocalTyping(signal));
        Some(signal)
    }

    /// Drive the typing timer; call periodically
    pub fn tick(&mut self) -> Option<TypingSignal> {
        let now = self.clock.now();
        let signal = self.active.as_mut()?.presence.tick(now)?;
        self.sink.emit(SessionEvent::LocalTyping(signal));
        Some(signal)
    }

    /// Mark the conversation read up to its latest confirmed message
    pub fn mark_read(&mut self) -> Option<MarkReadRequest> {
        self.active.as_mut()?.mark_latest_read()
    }

    /// Apply a mark-read acknowledgement
    ///
    /// Returns true when the read position moved forward.
    pub fn complete_mark(&mut self, request: &MarkReadRequest, at: Timestamp) -> bool {
        let Some(active) = matching(
            &mut self.active,
            &request.conversation_id,
            request.generation,
            "read acknowledgement",
        ) else {
            return false;
        };
        let up_to = request.up_to.clone();
        let advanced = active.receipts.complete_mark(up_to.clone(), at);
        let unread = active.refresh_unread(&self.local_user);

        if advanced {
            self.sink.emit(SessionEvent::ReadAdvanced { up_to });
        }
        if let Some(count) = unread {
            self.sink.emit(SessionEvent::UnreadChanged { count });
        }
        advanced
    }

    /// Apply a failed mark-read request
    pub fn fail_mark(&mut self, request: &MarkReadRequest, reason: impl Into<String>) {
        let Some(active) = matching(
            &mut self.active,
            &request.conversation_id,
            request.generation,
            "read failure",
        ) else {
            return;
        };
        active.receipts.fail_mark();
        self.sink.emit(SessionEvent::TransportFailure {
            kind: FailureKind::MarkRead,
            client_temp_id: None,
            reason: reason.into(),
        });
    }

    /// Replace the participant roster of the open conversation
    pub fn set_participants(&mut self, participants: Vec<Participant>) {
        if let Some(active) = self.active.as_mut() {
            active.participants = participants
                .into_iter()
                .map(|participant| (participant.user_id.clone(), participant))
                .collect();
        }
    }

    /// Apply server-pushed traffic
    pub fn handle_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::NewMessage {
                message,
                correlation,
            } => self.on_new_message(message, correlation),
            InboundEvent::Typing {
                conversation_id,
                user_id,
                is_typing,
            } => self.on_remote_typing(&conversation_id, user_id, is_typing),
            InboundEvent::ReadAck {
                conversation_id,
                reader,
                up_to,
                at,
            } => self.on_read_ack(&conversation_id, &reader, up_to, at),
            InboundEvent::Presence {
                user_id,
                is_online,
                last_seen_at,
            } => self.on_presence(user_id, is_online, last_seen_at),
            InboundEvent::Connection { connected } => self.on_connection(connected),
        }
    }

    fn on_new_message(&mut self, message: Message, correlation: Option<ClientTempId>) {
        let conversation_id = message.conversation_id.clone();
        let Some(active) = addressed(&mut self.active, &conversation_id, "incoming message") else {
            return;
        };

        let message_id = message.id.clone();
        let outcome = active.store.append_incoming(message, correlation);
        let visible = !active.minimized;
        let unread = active.refresh_unread(&self.local_user);

        match outcome {
            AppendOutcome::Inserted { index } => {
                self.sink.emit(SessionEvent::MessageInserted { message_id, index });
                if visible {
                    self.sink.emit(SessionEvent::ScrollToBottom);
                }
            }
            AppendOutcome::Reconciled {
                index,
                client_temp_id,
            } => {
                self.sink.emit(SessionEvent::MessageReconciled {
                    client_temp_id,
                    message_id,
                    index,
                });
            }
            AppendOutcome::Duplicate => {
                trace!("Incoming {} already in the log", message_id);
            }
        }
        if let Some(count) = unread {
            self.sink.emit(SessionEvent::UnreadChanged { count });
        }
    }

    fn on_remote_typing(&mut self, conversation_id: &ConversationId, user_id: UserId, is_typing: bool) {
        if user_id == self.local_user {
            return;
        }
        let Some(active) = addressed(&mut self.active, conversation_id, "typing signal") else {
            return;
        };
        if active.presence.on_remote_typing(user_id, is_typing) {
            let typers = active.typers();
            self.sink.emit(SessionEvent::RemoteTypersChanged { typers });
        }
    }

    fn on_read_ack(
        &mut self,
        conversation_id: &ConversationId,
        reader: &UserId,
        up_to: MessageId,
        at: Timestamp,
    ) {
        let own_ack = reader == &self.local_user;
        let Some(active) = addressed(&mut self.active, conversation_id, "read ack") else {
            return;
        };

        if !own_ack {
            let updated = active.store.mark_read_by_peer(&up_to, at);
            if updated > 0 {
                self.sink.emit(SessionEvent::PeerRead { up_to, updated });
            }
            return;
        }

        // Own read position from another device
        let Some(marker) = active.store.get(&up_to).map(ReadMarker::for_message) else {
            trace!("Read ack for unknown message {} ignored", up_to);
            return;
        };
        let advanced = active.receipts.apply_remote_ack(marker.clone(), at);
        let unread = active.refresh_unread(&self.local_user);
        if advanced {
            self.sink.emit(SessionEvent::ReadAdvanced { up_to: marker });
        }
        if let Some(count) = unread {
            self.sink.emit(SessionEvent::UnreadChanged { count });
        }
    }

    fn on_presence(&mut self, user_id: UserId, is_online: bool, last_seen_at: Option<Timestamp>) {
        let now = self.clock.now();
        let Some(participant) = self
            .active
            .as_mut()
            .and_then(|active| active.participants.get_mut(&user_id))
        else {
            return;
        };
        let changed = participant.is_online != is_online;
        participant.set_online(is_online, last_seen_at, now);
        if changed {
            self.sink.emit(SessionEvent::ParticipantPresence { user_id, is_online });
        }
    }

    fn on_connection(&mut self, connected: bool) {
        if self.connected == connected {
            return;
        }
        self.connected = connected;
        info!("Transport {}", if connected { "connected" } else { "disconnected" });
        self.sink.emit(SessionEvent::ConnectionChanged { connected });

        // Stop signals cannot arrive while disconnected
        if !connected {
            if let Some(active) = self.active.as_mut() {
                if active.presence.clear_remote_typers() {
                    self.sink.emit(SessionEvent::RemoteTypersChanged { typers: Vec::new() });
                }
            }
        }
    }

    fn discard_active(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        if let Some(signal) = active.presence.on_send_or_blur() {
            self.sink.emit(SessionEvent::LocalTyping(signal));
        }
        let dropped = active.store.pending_count();
        if dropped > 0 {
            debug!(
                "Discarding {} with {} unconfirmed sends",
                active.conversation_id, dropped
            );
        }
        info!("Closed conversation {}", active.conversation_id);
        self.sink.emit(SessionEvent::Closed {
            conversation_id: active.conversation_id,
        });
    }
}
