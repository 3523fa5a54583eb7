//! Paged history results

use serde::{Deserialize, Serialize};

/// One page of results from a history fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in ascending chronological order
    pub items: Vec<T>,
    /// True when the server has nothing older than this page
    pub is_last_page: bool,
}

impl<T> Page<T> {
    /// Create a page
    pub fn new(items: Vec<T>, is_last_page: bool) -> Self {
        Self {
            items,
            is_last_page,
        }
    }

    /// An empty, final page
    pub fn empty() -> Self {
        Self::new(Vec::new(), true)
    }

    /// Whether the page carries no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
