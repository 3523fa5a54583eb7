//! Conversation participants

use crate::model::ids::{Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// A member of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant identifier
    pub user_id: UserId,
    /// Login name
    pub username: String,
    /// Name shown in the UI
    pub display_name: String,
    /// Avatar reference resolved by the presentation layer
    pub avatar_ref: Option<String>,
    /// Whether the participant is currently connected
    #[serde(default)]
    pub is_online: bool,
    /// Last time the participant was seen online
    #[serde(default)]
    pub last_seen_at: Option<Timestamp>,
}

impl Participant {
    /// Create an offline participant
    pub fn new(
        user_id: impl Into<UserId>,
        username: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            display_name: display_name.into(),
            avatar_ref: None,
            is_online: false,
            last_seen_at: None,
        }
    }

    /// Update online status
    ///
    /// Going offline records `last_seen_at` when the transport did not supply one.
    pub fn set_online(&mut self, online: bool, last_seen_at: Option<Timestamp>, now: Timestamp) {
        if self.is_online && !online {
            self.last_seen_at = Some(last_seen_at.unwrap_or(now));
        } else if let Some(seen) = last_seen_at {
            self.last_seen_at = Some(seen);
        }
        self.is_online = online;
    }
}
