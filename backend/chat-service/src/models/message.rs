use super::user::UserId;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Message body. Closed set of variants; `Recalled` is the tombstone that
/// replaces any other variant when the sender recalls the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image {
        urls: Vec<String>,
    },
    Video {
        urls: Vec<String>,
    },
    Audio {
        url: String,
    },
    File {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Recalled,
}

impl MessageContent {
    pub fn is_recalled(&self) -> bool {
        matches!(self, MessageContent::Recalled)
    }

    /// The sendable kind of this content; `None` for the tombstone
    pub fn kind(&self) -> Option<ContentKind> {
        match self {
            MessageContent::Text { .. } => Some(ContentKind::Text),
            MessageContent::Image { .. } => Some(ContentKind::Image),
            MessageContent::Video { .. } => Some(ContentKind::Video),
            MessageContent::Audio { .. } => Some(ContentKind::Audio),
            MessageContent::File { .. } => Some(ContentKind::File),
            MessageContent::Recalled => None,
        }
    }
}

/// Content kinds a client may send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Image,
    Video,
    Audio,
    File,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
            ContentKind::Video => "video",
            ContentKind::Audio => "audio",
            ContentKind::File => "file",
        }
    }
}

impl FromStr for ContentKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(ContentKind::Text),
            "image" => Ok(ContentKind::Image),
            "video" => Ok(ContentKind::Video),
            "audio" => Ok(ContentKind::Audio),
            "file" => Ok(ContentKind::File),
            other => Err(AppError::Validation(format!(
                "unsupported message type: {other}"
            ))),
        }
    }
}

/// Stored message record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: UserId,
    pub content: MessageContent,
    /// Per-conversation append order, breaks `created_at` ties
    pub sequence_number: i64,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn summary(&self) -> MessageSummary {
        MessageSummary {
            message_id: self.id,
            sender_id: self.sender_id.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
        }
    }
}

/// A message that has been assigned its id and timestamp but not yet its
/// sequence number, which the log allocates on insert.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
}

impl PendingMessage {
    pub fn into_message(self, sequence_number: i64) -> Message {
        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            content: self.content,
            sequence_number,
            created_at: self.created_at,
        }
    }
}

/// Denormalized copy of the latest message kept on the conversation row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub message_id: Uuid,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
}
