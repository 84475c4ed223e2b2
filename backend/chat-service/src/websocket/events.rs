//! Realtime events pushed to client sessions.
//!
//! Every event is a JSON text frame of the form
//! ```json
//! { "type": "new_message", "payload": { ... } }
//! ```
//! Serialization happens once per broadcast, so every recipient gets the same bytes.

use crate::models::{ConversationSummary, Message, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RealtimeEvent {
    NewMessage {
        message: Message,
        conversation: ConversationSummary,
    },
    RecalledMessage {
        message: Message,
        conversation: ConversationSummary,
    },
    /// Multi-device sync for the acting user only
    ConversationSeen { conversation_id: Uuid },
    ConversationUpdated {
        change: MembershipChange,
        conversation: ConversationSummary,
    },

    // Pushed on behalf of the post and friend-graph services
    NewPost { post: Value },
    FriendRequestReceived { request: Value },
    FriendRequestAccepted { request: Value },

    /// Answer to an inbound `ping`
    Pong,
}

/// What changed in a `conversation_updated` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MembershipChange {
    Created,
    MemberAdded { user_id: UserId },
    MemberLeft { user_id: UserId },
    Renamed,
    AvatarChanged,
}

impl RealtimeEvent {
    /// Wire name of the event; also the metrics label
    pub fn event_type(&self) -> &'static str {
        match self {
            RealtimeEvent::NewMessage { .. } => "new_message",
            RealtimeEvent::RecalledMessage { .. } => "recalled_message",
            RealtimeEvent::ConversationSeen { .. } => "conversation_seen",
            RealtimeEvent::ConversationUpdated { .. } => "conversation_updated",
            RealtimeEvent::NewPost { .. } => "new_post",
            RealtimeEvent::FriendRequestReceived { .. } => "friend_request_received",
            RealtimeEvent::FriendRequestAccepted { .. } => "friend_request_accepted",
            RealtimeEvent::Pong => "pong",
        }
    }

    /// Serialize once into an immutable shared frame
    pub fn to_frame(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}
