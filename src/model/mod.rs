//! Conversation data model
//!
//! This module holds the plain data types the engine works on:
//! - `ids` - Opaque identifiers and the millisecond `Timestamp`
//! - `message` - Confirmed messages, attachments and outgoing payloads
//! - `participant` - Conversation members and their online status
//! - `page` - The tagged result type for history pages
//!
//! Everything here is transport-neutral. Decoding of wire formats happens in
//! `Transport` implementations before values reach the engine.

pub mod ids;
pub mod message;
pub mod page;
pub mod participant;

pub use ids::{ClientTempId, ConversationId, MessageId, Timestamp, UserId};
pub use message::{AttachmentRef, Message, MessageType, OutgoingPayload};
pub use page::Page;
pub use participant::Participant;
