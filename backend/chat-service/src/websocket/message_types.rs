use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound frames from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsInboundEvent {
    /// Acknowledge the latest message of a conversation
    MarkSeen { conversation_id: Uuid },
    /// Present a fresh credential; a rejected one closes the session
    Reauthenticate { token: String },
    Ping,
}
