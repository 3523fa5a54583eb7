//! Backward paging of conversation history
//!
//! The cursor tracks the oldest loaded timestamp and whether the server has
//! anything older. It never fetches by itself: `request_older` hands back a
//! `FetchOlderRequest` for the transport to execute and the result comes
//! back through `complete_older` or `fail_older`.

use crate::model::{ConversationId, Message, Page, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parameters for one history fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOlderRequest {
    /// Conversation to page through
    pub conversation_id: ConversationId,
    /// Fetch messages strictly older than this; `None` means newest page
    pub before: Option<Timestamp>,
    /// Maximum number of messages to return
    pub page_size: u32,
    /// Session generation that issued the request (0 outside a session)
    #[serde(default)]
    pub generation: u64,
}

/// Pagination boundary for one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Conversation being paged
    pub conversation_id: ConversationId,
    /// Earliest timestamp loaded so far
    pub oldest_loaded_at: Option<Timestamp>,
    /// Whether the server reported more history
    pub has_more_older: bool,
    /// Whether a fetch is in flight
    pub loading: bool,
}

/// What a completed page changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorAdvance {
    /// First page for this conversation (the view should jump to the bottom)
    pub first_load: bool,
    /// Whether more history can be requested
    pub has_more_older: bool,
}

/// Backward pager
#[derive(Debug, Clone)]
pub struct PaginationCursor {
    cursor: Cursor,
    page_size: u32,
}

impl PaginationCursor {
    /// Create a cursor with nothing loaded yet
    pub fn new(conversation_id: ConversationId, page_size: u32) -> Self {
        Self {
            cursor: Cursor {
                conversation_id,
                oldest_loaded_at: None,
                has_more_older: true,
                loading: false,
            },
            page_size: page_size.max(1),
        }
    }

    /// Current cursor state
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Whether a fetch is in flight
    pub fn is_loading(&self) -> bool {
        self.cursor.loading
    }

    /// Whether older history may exist
    pub fn has_more_older(&self) -> bool {
        self.cursor.has_more_older
    }

    /// Ask for the next older page
    ///
    /// Returns `None` while a fetch is in flight or once the server reported
    /// the last page.
    pub fn request_older(&mut self) -> Option<FetchOlderRequest> {
        if self.cursor.loading || !self.cursor.has_more_older {
            return None;
        }
        self.cursor.loading = true;
        debug!(
            "Requesting history for {} before {:?}",
            self.cursor.conversation_id, self.cursor.oldest_loaded_at
        );
        Some(FetchOlderRequest {
            conversation_id: self.cursor.conversation_id.clone(),
            before: self.cursor.oldest_loaded_at,
            page_size: self.page_size,
            generation: 0,
        })
    }

    /// Apply a fetched page
    pub fn complete_older(&mut self, page: &Page<Message>) -> CursorAdvance {
        let first_load = self.cursor.oldest_loaded_at.is_none();
        let earliest = page.items.iter().map(|message| message.created_at).min();

        if let Some(earliest) = earliest {
            self.cursor.oldest_loaded_at = Some(match self.cursor.oldest_loaded_at {
                Some(current) => current.min(earliest),
                None => earliest,
            });
        }
        self.cursor.has_more_older = !page.is_last_page;
        self.cursor.loading = false;

        CursorAdvance {
            first_load: first_load && self.cursor.oldest_loaded_at.is_some(),
            has_more_older: self.cursor.has_more_older,
        }
    }

    /// Give up on the in-flight fetch; history can be requested again
    pub fn fail_older(&mut self) {
        self.cursor.loading = false;
    }
}

/// Scroll position bookkeeping around a history splice
///
/// Capture the content height before the page is spliced in, then shift the
/// scroll offset by `offset_adjustment(new_height)` so the visible content
/// stays put.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollAnchor {
    old_height: f64,
}

impl ScrollAnchor {
    /// Record the scroll container's content height before the splice
    pub fn capture(old_height: f64) -> Self {
        Self { old_height }
    }

    /// Offset delta to apply after the splice
    pub fn offset_adjustment(&self, new_height: f64) -> f64 {
        new_height - self.old_height
    }
}
