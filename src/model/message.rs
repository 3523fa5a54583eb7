//! Message structures and outgoing payloads

use crate::model::ids::{ClientTempId, ConversationId, MessageId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Kind of message content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Plain text authored by a participant
    #[default]
    Text,
    /// A file shared through an attachment record
    File,
    /// Server-generated notice (joins, renames, ...)
    System,
}

/// Reference to an already uploaded file
///
/// Uploading is done outside the engine; this is the record the upload
/// collaborator hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Location the file can be fetched from
    pub url: String,
    /// Original file name
    pub file_name: String,
    /// MIME type reported by the uploader
    pub mime_type: String,
    /// Size of the file in bytes
    pub size_bytes: u64,
}

/// A server-confirmed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned identifier
    pub id: MessageId,
    /// Correlation key echoed back for messages this client sent
    #[serde(default)]
    pub client_temp_id: Option<ClientTempId>,
    /// Conversation the message belongs to
    pub conversation_id: ConversationId,
    /// Author
    pub sender_id: UserId,
    /// Message body
    pub content: String,
    /// Kind of content
    #[serde(default)]
    pub message_type: MessageType,
    /// Server creation time
    pub created_at: Timestamp,
    /// When the other side read it, if known
    #[serde(default)]
    pub read_at: Option<Timestamp>,
    /// Attached file, for `MessageType::File`
    #[serde(default)]
    pub attachment: Option<AttachmentRef>,
}

impl Message {
    /// Create a new text message
    pub fn new(
        id: impl Into<MessageId>,
        conversation_id: impl Into<ConversationId>,
        sender_id: impl Into<UserId>,
        content: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            client_temp_id: None,
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            message_type: MessageType::Text,
            created_at,
            read_at: None,
            attachment: None,
        }
    }

    /// Set the correlation key echoed by the transport
    pub fn with_client_temp_id(mut self, client_temp_id: impl Into<ClientTempId>) -> Self {
        self.client_temp_id = Some(client_temp_id.into());
        self
    }

    /// Set the message type
    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    /// Attach a file record (switches the type to `File`)
    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.message_type = MessageType::File;
        self.attachment = Some(attachment);
        self
    }

    /// Whether `user` authored this message
    pub fn is_from(&self, user: &UserId) -> bool {
        &self.sender_id == user
    }

    /// Ordering key inside a conversation log
    pub fn sort_key(&self) -> (Timestamp, &str) {
        (self.created_at, self.id.as_str())
    }
}

/// What the local user asked to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingPayload {
    /// Message body
    pub content: String,
    /// Kind of content
    #[serde(default)]
    pub message_type: MessageType,
    /// Attached file record, if any
    #[serde(default)]
    pub attachment: Option<AttachmentRef>,
}

impl OutgoingPayload {
    /// A plain text payload
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: MessageType::Text,
            attachment: None,
        }
    }

    /// A file payload built from an upload result
    pub fn file(attachment: AttachmentRef, caption: impl Into<String>) -> Self {
        Self {
            content: caption.into(),
            message_type: MessageType::File,
            attachment: Some(attachment),
        }
    }
}
