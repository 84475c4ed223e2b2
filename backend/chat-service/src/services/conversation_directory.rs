//! Conversation identity, membership and group metadata.
//!
//! Direct conversations are deduplicated by their canonical participant key.
//! The storage layer's unique constraint is the real guard: a create that
//! loses a race re-reads the winner instead of failing.

use crate::error::{AppError, AppResult, ForbiddenReason, Resource};
use crate::models::{
    direct_key, stored_now, Conversation, MessageSummary, ParticipantState, UserId,
};
use crate::storage::{ConversationStore, InsertOutcome};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

const GROUP_NAME_MAX_CHARS: usize = 100;

#[derive(Clone)]
pub struct ConversationDirectory {
    store: Arc<dyn ConversationStore>,
}

impl ConversationDirectory {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    pub async fn find_or_create_direct(&self, a: &UserId, b: &UserId) -> AppResult<Conversation> {
        if a == b {
            return Err(AppError::Validation(
                "a direct conversation needs two distinct participants".into(),
            ));
        }

        let key = direct_key(a, b);
        if let Some(existing) = self.store.find_direct(&key).await? {
            return Self::checked_pair(existing, a, b);
        }

        let candidate = Conversation::new_direct(a.clone(), b.clone(), stored_now());
        match self.store.insert_conversation(&candidate).await? {
            InsertOutcome::Inserted => {
                info!(conversation_id = %candidate.id, "direct conversation created");
                Ok(candidate)
            }
            InsertOutcome::DirectExists => {
                debug!("direct conversation create lost race, re-reading winner");
                let winner = self.store.find_direct(&key).await?.ok_or_else(|| {
                    AppError::Database("direct conversation vanished after conflict".into())
                })?;
                Self::checked_pair(winner, a, b)
            }
        }
    }

    /// A record found by key must hold exactly this pair
    fn checked_pair(conversation: Conversation, a: &UserId, b: &UserId) -> AppResult<Conversation> {
        if conversation.is_direct_between(a, b) {
            return Ok(conversation);
        }
        error!(
            conversation_id = %conversation.id,
            "direct key resolved to a conversation of another pair"
        );
        Err(AppError::Internal)
    }

    /// Always a fresh record; `members` is deduplicated preserving order
    pub async fn create_group(
        &self,
        members: Vec<UserId>,
        name: Option<String>,
        avatar_url: Option<String>,
    ) -> AppResult<Conversation> {
        let mut unique: Vec<UserId> = Vec::with_capacity(members.len());
        for member in members {
            if !unique.contains(&member) {
                unique.push(member);
            }
        }
        if unique.len() < 2 {
            return Err(AppError::Validation(
                "a group needs at least two participants".into(),
            ));
        }
        let name = name.map(|n| validate_group_name(&n)).transpose()?;

        let group = Conversation::new_group(unique, name, avatar_url, stored_now());
        self.store.insert_conversation(&group).await?;
        info!(
            conversation_id = %group.id,
            participants = group.participants.len(),
            "group conversation created"
        );
        Ok(group)
    }

    pub async fn get(&self, conversation_id: Uuid) -> AppResult<Conversation> {
        self.store
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound(Resource::Conversation))
    }

    pub fn require_participant<'a>(
        &self,
        conversation: &'a Conversation,
        user_id: &UserId,
    ) -> AppResult<&'a ParticipantState> {
        conversation
            .participant(user_id)
            .ok_or(AppError::Forbidden(ForbiddenReason::NotParticipant))
    }

    /// Load and check membership in one step
    pub async fn get_for_participant(
        &self,
        conversation_id: Uuid,
        user_id: &UserId,
    ) -> AppResult<Conversation> {
        let conversation = self.get(conversation_id).await?;
        self.require_participant(&conversation, user_id)?;
        Ok(conversation)
    }

    pub async fn add_member(
        &self,
        conversation_id: Uuid,
        acting_user: &UserId,
        new_user: &UserId,
    ) -> AppResult<Conversation> {
        let conversation = self.get_for_participant(conversation_id, acting_user).await?;
        if !conversation.is_group {
            return Err(AppError::Validation(
                "members can only be added to groups".into(),
            ));
        }
        if conversation.has_participant(new_user) {
            return Err(AppError::Validation("user is already a participant".into()));
        }

        let participant = ParticipantState::new(new_user.clone(), stored_now());
        if !self.store.add_participant(conversation_id, &participant).await? {
            // a concurrent add won
            return Err(AppError::Validation("user is already a participant".into()));
        }
        self.get(conversation_id).await
    }

    /// Leave a group. The row is kept even when nobody remains; it is then
    /// stamped `dissolved_at`.
    pub async fn remove_member(
        &self,
        conversation_id: Uuid,
        user_id: &UserId,
    ) -> AppResult<Conversation> {
        let conversation = self.get_for_participant(conversation_id, user_id).await?;
        if !conversation.is_group {
            return Err(AppError::Validation("only groups can be left".into()));
        }
        if !self
            .store
            .remove_participant(conversation_id, user_id, stored_now())
            .await?
        {
            return Err(AppError::Forbidden(ForbiddenReason::NotParticipant));
        }
        self.get(conversation_id).await
    }

    pub async fn rename(
        &self,
        conversation_id: Uuid,
        acting_user: &UserId,
        new_name: &str,
    ) -> AppResult<Conversation> {
        let conversation = self.get_for_participant(conversation_id, acting_user).await?;
        require_group(&conversation)?;
        let name = validate_group_name(new_name)?;
        self.store.set_name(conversation_id, &name, stored_now()).await?;
        self.get(conversation_id).await
    }

    pub async fn set_avatar(
        &self,
        conversation_id: Uuid,
        acting_user: &UserId,
        url: Option<&str>,
    ) -> AppResult<Conversation> {
        let conversation = self.get_for_participant(conversation_id, acting_user).await?;
        require_group(&conversation)?;
        self.store.set_avatar(conversation_id, url, stored_now()).await?;
        self.get(conversation_id).await
    }

    /// Only the acting user's own participant state changes
    pub async fn set_muted(
        &self,
        conversation_id: Uuid,
        acting_user: &UserId,
        muted: bool,
    ) -> AppResult<Conversation> {
        self.get_for_participant(conversation_id, acting_user).await?;
        if !self.store.set_muted(conversation_id, acting_user, muted).await? {
            return Err(AppError::Forbidden(ForbiddenReason::NotParticipant));
        }
        self.get(conversation_id).await
    }

    /// Set the preview, touch `updated_at`, reset the seen set to the sender
    pub async fn update_preview_and_touch(
        &self,
        conversation_id: Uuid,
        summary: &MessageSummary,
    ) -> AppResult<Conversation> {
        let applied = self
            .store
            .set_last_message(conversation_id, summary, stored_now())
            .await?;
        if !applied {
            debug!(
                conversation_id = %conversation_id,
                message_id = %summary.message_id,
                "newer preview already stored"
            );
        }
        self.get(conversation_id).await
    }

    pub async fn mark_seen(
        &self,
        conversation_id: Uuid,
        user_id: &UserId,
    ) -> AppResult<Conversation> {
        let conversation = self.get_for_participant(conversation_id, user_id).await?;
        if conversation.seen_by.contains(user_id) {
            return Ok(conversation);
        }
        self.store.add_seen(conversation_id, user_id).await?;
        self.get(conversation_id).await
    }

    /// Rewrite the preview to the tombstone if it still shows `message_id`
    pub async fn recall_preview(&self, conversation_id: Uuid, message_id: Uuid) -> AppResult<bool> {
        self.store.recall_last_message(conversation_id, message_id).await
    }

    /// Hide everything up to now from `user_id` only
    pub async fn clear_history(
        &self,
        conversation_id: Uuid,
        user_id: &UserId,
    ) -> AppResult<Conversation> {
        self.get_for_participant(conversation_id, user_id).await?;
        if !self
            .store
            .set_delete_watermark(conversation_id, user_id, stored_now())
            .await?
        {
            return Err(AppError::Forbidden(ForbiddenReason::NotParticipant));
        }
        self.get(conversation_id).await
    }

    pub async fn list_for_user(
        &self,
        user_id: &UserId,
        skip: usize,
        limit: usize,
    ) -> AppResult<Vec<Conversation>> {
        self.store.list_for_user(user_id, skip, limit).await
    }
}

fn require_group(conversation: &Conversation) -> AppResult<()> {
    if conversation.is_group {
        Ok(())
    } else {
        Err(AppError::Validation(
            "only group conversations have a name and avatar".into(),
        ))
    }
}

fn validate_group_name(name: &str) -> AppResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("group name must not be empty".into()));
    }
    if trimmed.chars().count() > GROUP_NAME_MAX_CHARS {
        return Err(AppError::Validation(format!(
            "group name must be at most {GROUP_NAME_MAX_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}
