//! In-process store used for local runs without `DATABASE_URL` and by the
//! test suite. Enforces the same direct-conversation uniqueness as the
//! PostgreSQL schema.

use super::{ConversationStore, InsertOutcome, MessageLog};
use crate::error::{AppError, AppResult, Resource};
use crate::models::{
    Conversation, Message, MessageContent, MessageSummary, ParticipantState, PendingMessage,
    UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    conversations: HashMap<Uuid, Conversation>,
    // direct_key -> conversation id
    direct_index: HashMap<String, Uuid>,
    messages: HashMap<Uuid, Message>,
    // conversation id -> message ids in append order
    timelines: HashMap<Uuid, Vec<Uuid>>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations (all kinds)
    pub async fn conversation_count(&self) -> usize {
        self.state.lock().await.conversations.len()
    }
}

fn conversation_mut<'a>(state: &'a mut State, id: Uuid) -> AppResult<&'a mut Conversation> {
    state
        .conversations
        .get_mut(&id)
        .ok_or(AppError::NotFound(Resource::Conversation))
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<InsertOutcome> {
        let mut state = self.state.lock().await;
        if let Some(key) = conversation.direct_key() {
            if state.direct_index.contains_key(&key) {
                return Ok(InsertOutcome::DirectExists);
            }
            state.direct_index.insert(key, conversation.id);
        }
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.state.lock().await.conversations.get(&id).cloned())
    }

    async fn find_direct(&self, direct_key: &str) -> AppResult<Option<Conversation>> {
        let state = self.state.lock().await;
        Ok(state
            .direct_index
            .get(direct_key)
            .and_then(|id| state.conversations.get(id))
            .cloned())
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        skip: usize,
        limit: usize,
    ) -> AppResult<Vec<Conversation>> {
        let state = self.state.lock().await;
        let mut matching: Vec<&Conversation> = state
            .conversations
            .values()
            .filter(|c| c.has_participant(user_id))
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(matching
            .into_iter()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn add_participant(&self, id: Uuid, participant: &ParticipantState) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let conversation = conversation_mut(&mut state, id)?;
        if conversation.has_participant(&participant.user_id) {
            return Ok(false);
        }
        conversation.participants.push(participant.clone());
        conversation.updated_at = participant.joined_at;
        Ok(true)
    }

    async fn remove_participant(
        &self,
        id: Uuid,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let conversation = conversation_mut(&mut state, id)?;
        let before = conversation.participants.len();
        conversation.participants.retain(|p| &p.user_id != user_id);
        if conversation.participants.len() == before {
            return Ok(false);
        }
        conversation.seen_by.retain(|u| u != user_id);
        conversation.updated_at = now;
        if conversation.participants.is_empty() {
            conversation.dissolved_at = Some(now);
        }
        Ok(true)
    }

    async fn set_name(&self, id: Uuid, name: &str, now: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let conversation = conversation_mut(&mut state, id)?;
        conversation.name = Some(name.to_string());
        conversation.updated_at = now;
        Ok(())
    }

    async fn set_avatar(&self, id: Uuid, url: Option<&str>, now: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let conversation = conversation_mut(&mut state, id)?;
        conversation.avatar_url = url.map(str::to_string);
        conversation.updated_at = now;
        Ok(())
    }

    async fn set_muted(&self, id: Uuid, user_id: &UserId, muted: bool) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let conversation = conversation_mut(&mut state, id)?;
        match conversation
            .participants
            .iter_mut()
            .find(|p| &p.user_id == user_id)
        {
            Some(participant) => {
                participant.muted = muted;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_delete_watermark(
        &self,
        id: Uuid,
        user_id: &UserId,
        watermark: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let conversation = conversation_mut(&mut state, id)?;
        match conversation
            .participants
            .iter_mut()
            .find(|p| &p.user_id == user_id)
        {
            Some(participant) => {
                participant.delete_watermark = Some(watermark);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_last_message(
        &self,
        id: Uuid,
        summary: &MessageSummary,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let conversation = conversation_mut(&mut state, id)?;
        let is_newer = conversation
            .last_message
            .as_ref()
            .map(|current| current.created_at <= summary.created_at)
            .unwrap_or(true);
        if !is_newer {
            return Ok(false);
        }
        conversation.last_message = Some(summary.clone());
        conversation.seen_by = vec![summary.sender_id.clone()];
        conversation.updated_at = now;
        Ok(true)
    }

    async fn recall_last_message(&self, id: Uuid, message_id: Uuid) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let conversation = conversation_mut(&mut state, id)?;
        match conversation.last_message.as_mut() {
            Some(summary) if summary.message_id == message_id => {
                summary.content = MessageContent::Recalled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn add_seen(&self, id: Uuid, user_id: &UserId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let conversation = conversation_mut(&mut state, id)?;
        if !conversation.seen_by.contains(user_id) {
            conversation.seen_by.push(user_id.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl MessageLog for MemoryStore {
    async fn insert_message(&self, pending: PendingMessage) -> AppResult<Message> {
        let mut state = self.state.lock().await;
        if !state.conversations.contains_key(&pending.conversation_id) {
            return Err(AppError::NotFound(Resource::Conversation));
        }
        let timeline = state.timelines.entry(pending.conversation_id).or_default();
        let message = pending.into_message(timeline.len() as i64 + 1);
        timeline.push(message.id);
        state.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        Ok(self.state.lock().await.messages.get(&id).cloned())
    }

    async fn replace_content(
        &self,
        id: Uuid,
        content: &MessageContent,
    ) -> AppResult<Option<Message>> {
        let mut state = self.state.lock().await;
        Ok(state.messages.get_mut(&id).map(|message| {
            message.content = content.clone();
            message.clone()
        }))
    }

    async fn list_newest_first(
        &self,
        conversation_id: Uuid,
        after: Option<DateTime<Utc>>,
        skip: usize,
        limit: usize,
    ) -> AppResult<Vec<Message>> {
        let state = self.state.lock().await;
        let mut visible: Vec<&Message> = state
            .timelines
            .get(&conversation_id)
            .map(|ids| ids.iter().filter_map(|id| state.messages.get(id)).collect())
            .unwrap_or_default();
        visible.retain(|m| after.map(|watermark| m.created_at > watermark).unwrap_or(true));
        visible.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.sequence_number.cmp(&a.sequence_number))
        });
        Ok(visible.into_iter().skip(skip).take(limit).cloned().collect())
    }
}
