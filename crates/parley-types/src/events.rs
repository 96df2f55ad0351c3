use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MessageId, base64_bytes};

/// Events sent FROM client TO server over the socket.
///
/// Every frame is `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Announce a display name. Moves the connection into the roster.
    Join { username: String },

    /// Post a text message to the room
    SendMessage { message: String },

    /// Post a file to the room
    ShareDocument(DocumentUpload),

    /// Relay the sender's own typing state to everyone else
    #[serde(rename_all = "camelCase")]
    Typing { is_typing: bool },

    /// Remove a message from the log
    DeleteMessage { id: MessageId },

    /// Bump the tally for an emoji on a message
    AddReaction { id: MessageId, emoji: String },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::SendMessage { .. } => "send-message",
            Self::ShareDocument(_) => "share-document",
            Self::Typing { .. } => "typing",
            Self::DeleteMessage { .. } => "delete-message",
            Self::AddReaction { .. } => "add-reaction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpload {
    pub file_name: String,
    pub file_type: String,
    /// Size claimed by the client. Must match the decoded payload.
    pub file_size: u64,
    #[serde(with = "base64_bytes")]
    pub file_data: Bytes,
}

/// Events sent FROM server TO clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Someone joined; carries the full roster, not a delta
    UserJoined(RosterUpdate),

    /// Someone left; carries the full roster
    UserLeft(RosterUpdate),

    /// A text message was posted
    ReceiveMessage {
        id: MessageId,
        username: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A file was posted
    DocumentShared(SharedDocument),

    /// A peer started or stopped typing
    #[serde(rename_all = "camelCase")]
    UserTyping { username: String, is_typing: bool },

    /// A message was removed from the log
    MessageDeleted { id: MessageId },

    /// A reaction tally changed
    ReactionAdded {
        id: MessageId,
        emoji: String,
        count: u64,
    },

    /// The sender's last event was refused. Only ever sent to that sender.
    Rejected { code: RejectCode, reason: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserJoined(_) => "user-joined",
            Self::UserLeft(_) => "user-left",
            Self::ReceiveMessage { .. } => "receive-message",
            Self::DocumentShared(_) => "document-shared",
            Self::UserTyping { .. } => "user-typing",
            Self::MessageDeleted { .. } => "message-deleted",
            Self::ReactionAdded { .. } => "reaction-added",
            Self::Rejected { .. } => "rejected",
        }
    }

    pub fn rejected(code: RejectCode, reason: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterUpdate {
    /// The participant whose arrival or departure triggered this update
    pub username: String,
    pub users: Vec<RosterEntry>,
    pub user_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedDocument {
    pub id: MessageId,
    pub from: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    #[serde(with = "base64_bytes")]
    pub file_data: Bytes,
    pub timestamp: DateTime<Utc>,
}

/// Why an inbound event was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectCode {
    InvalidName,
    EmptyMessage,
    MessageTooLong,
    AttachmentTooLarge,
    InvalidAttachment,
    InvalidEmoji,
    NotJoined,
    NotFound,
    DuplicateReaction,
}

impl RejectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidName => "invalid-name",
            Self::EmptyMessage => "empty-message",
            Self::MessageTooLong => "message-too-long",
            Self::AttachmentTooLarge => "attachment-too-large",
            Self::InvalidAttachment => "invalid-attachment",
            Self::InvalidEmoji => "invalid-emoji",
            Self::NotJoined => "not-joined",
            Self::NotFound => "not-found",
            Self::DuplicateReaction => "duplicate-reaction",
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
