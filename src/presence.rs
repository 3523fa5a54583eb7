//! Typing presence
//!
//! Local keystrokes are turned into a single `Start` when typing begins and a
//! single `Stop` once input has been idle for the configured timeout, or
//! immediately on send/blur. Remote typers are tracked as a plain set driven
//! by explicit start/stop signals from the transport.

use crate::model::{ConversationId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::trace;

/// Default idle period before typing stops
pub const DEFAULT_TYPING_IDLE_MS: u64 = 2_000;

/// Outbound typing signal for the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypingSignal {
    /// The local user started typing
    Start,
    /// The local user stopped typing
    Stop,
}

/// Typing state of one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingState {
    /// Conversation the state belongs to
    pub conversation_id: ConversationId,
    /// Whether the local user is considered typing
    pub local_typing: bool,
    /// Other participants currently typing
    pub remote_typers: BTreeSet<UserId>,
    /// When the local typing state expires
    pub debounce_deadline: Option<Timestamp>,
}

/// Trailing-edge debouncer for local typing plus the remote typer set
#[derive(Debug, Clone)]
pub struct PresenceDebouncer {
    state: TypingState,
    idle_ms: u64,
}

impl PresenceDebouncer {
    /// Create an idle debouncer
    pub fn new(conversation_id: ConversationId, idle_ms: u64) -> Self {
        Self {
            state: TypingState {
                conversation_id,
                local_typing: false,
                remote_typers: BTreeSet::new(),
                debounce_deadline: None,
            },
            idle_ms,
        }
    }

    /// Current typing state
    pub fn state(&self) -> &TypingState {
        &self.state
    }

    /// Whether the local user is typing
    pub fn is_typing(&self) -> bool {
        self.state.local_typing
    }

    /// Register an input event
    ///
    /// Emits `Start` on the Idle to Typing transition. The idle deadline is
    /// pushed back on every call.
    pub fn on_input(&mut self, has_content: bool, now: Timestamp) -> Option<TypingSignal> {
        self.state.debounce_deadline = Some(now.plus_millis(self.idle_ms));

        if has_content && !self.state.local_typing {
            self.state.local_typing = true;
            trace!("Typing started in {}", self.state.conversation_id);
            return Some(TypingSignal::Start);
        }
        None
    }

    /// Expire the typing state once the deadline has passed
    pub fn tick(&mut self, now: Timestamp) -> Option<TypingSignal> {
        match self.state.debounce_deadline {
            Some(deadline) if self.state.local_typing && now >= deadline => {
                self.state.local_typing = false;
                self.state.debounce_deadline = None;
                trace!("Typing went idle in {}", self.state.conversation_id);
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }

    /// Stop typing right away (message sent or input lost focus)
    pub fn on_send_or_blur(&mut self) -> Option<TypingSignal> {
        self.state.debounce_deadline = None;
        if self.state.local_typing {
            self.state.local_typing = false;
            return Some(TypingSignal::Stop);
        }
        None
    }

    /// Apply a remote typing signal
    ///
    /// Returns true when the set of remote typers changed.
    pub fn on_remote_typing(&mut self, user_id: UserId, is_typing: bool) -> bool {
        if is_typing {
            self.state.remote_typers.insert(user_id)
        } else {
            self.state.remote_typers.remove(&user_id)
        }
    }

    /// Forget every remote typer (disconnect or conversation switch)
    ///
    /// Returns true when the set was non-empty.
    pub fn clear_remote_typers(&mut self) -> bool {
        let had_typers = !self.state.remote_typers.is_empty();
        self.state.remote_typers.clear();
        had_typers
    }

    /// Remote participants currently typing
    pub fn remote_typers(&self) -> impl Iterator<Item = &UserId> {
        self.state.remote_typers.iter()
    }
}
