use crate::error::{AppError, AppResult, ForbiddenReason, Resource};
use crate::models::{stored_now, Message, MessageContent, PendingMessage, UserId};
use crate::storage::MessageLog;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Append-only message log with the one-way recall transition
#[derive(Clone)]
pub struct MessageStore {
    log: Arc<dyn MessageLog>,
}

impl MessageStore {
    pub fn new(log: Arc<dyn MessageLog>) -> Self {
        Self { log }
    }

    /// Assign id and creation time, persist, return the stored record.
    /// Does not touch the conversation preview.
    pub async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: &UserId,
        content: MessageContent,
    ) -> AppResult<Message> {
        let pending = PendingMessage {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: sender_id.clone(),
            content,
            created_at: stored_now(),
        };
        self.log.insert_message(pending).await
    }

    pub async fn get(&self, message_id: Uuid) -> AppResult<Message> {
        self.log
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound(Resource::Message))
    }

    /// Replace the content with the tombstone. Repeating the call returns the
    /// same tombstone, but the sender check runs every time.
    pub async fn recall(&self, message_id: Uuid, requester_id: &UserId) -> AppResult<Message> {
        let message = self.get(message_id).await?;
        if &message.sender_id != requester_id {
            return Err(AppError::Forbidden(ForbiddenReason::NotSender));
        }
        if message.content.is_recalled() {
            return Ok(message);
        }
        self.log
            .replace_content(message_id, &MessageContent::Recalled)
            .await?
            .ok_or(AppError::NotFound(Resource::Message))
    }

    /// One page of the log as seen through `watermark`, oldest first.
    pub async fn list_visible(
        &self,
        conversation_id: Uuid,
        watermark: Option<DateTime<Utc>>,
        skip: usize,
        limit: usize,
    ) -> AppResult<Vec<Message>> {
        let mut page = self
            .log
            .list_newest_first(conversation_id, watermark, skip, limit)
            .await?;
        page.reverse();
        Ok(page)
    }
}
