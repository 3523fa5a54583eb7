//! Threadline - client-side conversation state engine
//!
//! This library keeps the state of one open chat conversation consistent
//! while messages, history pages, typing signals and read receipts arrive
//! out of order from an asynchronous transport.
//!
//! Components:
//! - `store` - ordered message log with optimistic sends and reconciliation
//! - `pagination` - backward history cursor
//! - `presence` - local typing debouncer and remote typers
//! - `receipts` - monotonic read position
//! - `session` - orchestrator for the open conversation
//! - `driver` - tokio task hosting a session against a `Transport`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod driver;
pub mod events;
pub mod model;
pub mod pagination;
pub mod presence;
pub mod receipts;
pub mod session;
pub mod settings;
pub mod store;
pub mod transport;

pub use driver::{SessionDriver, SessionHandle};
pub use events::{EventSink, SessionEvent};
pub use session::{ConversationSession, SessionStatus};
pub use settings::EngineSettings;
pub use transport::{InboundEvent, Transport};

/// Result type alias for Threadline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Threadline operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid or unreadable settings
    #[error("Settings error: {0}")]
    Settings(String),

    /// The session driver is no longer running
    #[error("Session driver has shut down")]
    SessionClosed,

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

/// Initialize the Threadline library with logging
pub fn init() {
    tracing_subscriber::fmt::init();
}

#[cfg(test)]
mod tests;
