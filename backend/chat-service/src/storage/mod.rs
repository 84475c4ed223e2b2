//! Persistence seams for conversations and the message log.
//!
//! Each operation is a single atomic mutation at the storage layer so that
//! concurrent requests never overwrite each other's changes with stale
//! whole-document writes.

pub mod memory;
pub mod postgres;

use crate::error::AppResult;
use crate::models::{
    Conversation, Message, MessageContent, MessageSummary, ParticipantState, PendingMessage,
    UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Result of inserting a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A direct conversation with the same canonical key already exists
    DirectExists,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert a new conversation. Direct conversations are subject to the
    /// unique canonical-key constraint.
    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<InsertOutcome>;

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    async fn find_direct(&self, direct_key: &str) -> AppResult<Option<Conversation>>;

    /// Conversations where `user_id` is a participant, most recently updated first
    async fn list_for_user(
        &self,
        user_id: &UserId,
        skip: usize,
        limit: usize,
    ) -> AppResult<Vec<Conversation>>;

    /// Returns false when the user is already a participant
    async fn add_participant(&self, id: Uuid, participant: &ParticipantState) -> AppResult<bool>;

    /// Returns false when the user was not a participant. Stamps
    /// `dissolved_at` when nobody remains.
    async fn remove_participant(
        &self,
        id: Uuid,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    async fn set_name(&self, id: Uuid, name: &str, now: DateTime<Utc>) -> AppResult<()>;

    async fn set_avatar(&self, id: Uuid, url: Option<&str>, now: DateTime<Utc>) -> AppResult<()>;

    /// Returns false when the user is not a participant
    async fn set_muted(&self, id: Uuid, user_id: &UserId, muted: bool) -> AppResult<bool>;

    /// Returns false when the user is not a participant
    async fn set_delete_watermark(
        &self,
        id: Uuid,
        user_id: &UserId,
        watermark: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Replace the preview, touch `updated_at` and reset the seen set to the
    /// sender. Skipped (returns false) when a newer preview is already stored.
    async fn set_last_message(
        &self,
        id: Uuid,
        summary: &MessageSummary,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Rewrite the preview content to the tombstone if it still refers to `message_id`
    async fn recall_last_message(&self, id: Uuid, message_id: Uuid) -> AppResult<bool>;

    /// Add to the seen set; no-op if present
    async fn add_seen(&self, id: Uuid, user_id: &UserId) -> AppResult<()>;
}

#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Persist a message, allocating its per-conversation sequence number
    async fn insert_message(&self, pending: PendingMessage) -> AppResult<Message>;

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Replace the content; returns the updated record
    async fn replace_content(
        &self,
        id: Uuid,
        content: &MessageContent,
    ) -> AppResult<Option<Message>>;

    /// Newest first, excluding messages created at or before `after`
    async fn list_newest_first(
        &self,
        conversation_id: Uuid,
        after: Option<DateTime<Utc>>,
        skip: usize,
        limit: usize,
    ) -> AppResult<Vec<Message>>;
}
