//! Orchestration of message and membership operations.
//!
//! Within one send the order is fixed: persist the message, then update the
//! preview, then broadcast. Broadcasts run detached from the request.

use crate::error::{AppError, AppResult};
use crate::metrics::{MEDIA_ROLLBACKS, MESSAGES_RECALLED, MESSAGES_SENT};
use crate::models::{
    ContentKind, Conversation, ConversationView, Message, MessageContent, UserId, UserProfile,
};
use crate::services::conversation_directory::ConversationDirectory;
use crate::services::media::{MediaKind, MediaStore, UploadedMedia};
use crate::services::message_store::MessageStore;
use crate::services::notifier::Notifier;
use crate::services::profiles::ProfileDirectory;
use crate::websocket::events::{MembershipChange, RealtimeEvent};
use bytes::Bytes;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_MESSAGE_PAGE: usize = 50;
pub const DEFAULT_CONVERSATION_PAGE: usize = 30;
pub const MAX_ATTACHMENTS: usize = 10;

/// One attachment as received from the client
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

/// A message before media upload and persistence
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub kind: ContentKind,
    pub text: Option<String>,
    pub attachments: Vec<AttachmentUpload>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Text,
            text: Some(text.into()),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(kind: ContentKind, attachments: Vec<AttachmentUpload>) -> Self {
        Self {
            kind,
            text: None,
            attachments,
        }
    }

    fn validate(&self) -> AppResult<()> {
        let count = self.attachments.len();
        if count > MAX_ATTACHMENTS {
            return Err(AppError::Validation(format!(
                "at most {MAX_ATTACHMENTS} attachments per message"
            )));
        }
        match self.kind {
            ContentKind::Text => {
                if count > 0 {
                    return Err(AppError::Validation(
                        "text messages cannot carry attachments".into(),
                    ));
                }
                if self.text.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(AppError::Validation("message text must not be empty".into()));
                }
            }
            ContentKind::Image | ContentKind::Video => {
                if count == 0 {
                    return Err(AppError::Validation(format!(
                        "{} messages need at least one attachment",
                        self.kind.as_str()
                    )));
                }
            }
            ContentKind::Audio | ContentKind::File => {
                if count != 1 {
                    return Err(AppError::Validation(format!(
                        "{} messages need exactly one attachment",
                        self.kind.as_str()
                    )));
                }
            }
        }
        if self.kind != ContentKind::Text && self.text.is_some() {
            return Err(AppError::Validation(format!(
                "{} messages cannot carry text",
                self.kind.as_str()
            )));
        }
        Ok(())
    }
}

pub struct ConversationService {
    directory: ConversationDirectory,
    messages: MessageStore,
    notifier: Notifier,
    media: Arc<dyn MediaStore>,
    profiles: Arc<dyn ProfileDirectory>,
    page_limit_max: usize,
}

impl ConversationService {
    pub fn new(
        directory: ConversationDirectory,
        messages: MessageStore,
        notifier: Notifier,
        media: Arc<dyn MediaStore>,
        profiles: Arc<dyn ProfileDirectory>,
        page_limit_max: usize,
    ) -> Self {
        Self {
            directory,
            messages,
            notifier,
            media,
            profiles,
            page_limit_max: page_limit_max.max(1),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn directory(&self) -> &ConversationDirectory {
        &self.directory
    }

    // ---------------------------------------------------------------------
    // Messages
    // ---------------------------------------------------------------------

    pub async fn send_message(
        &self,
        sender: &UserId,
        conversation_id: Uuid,
        outgoing: OutgoingMessage,
    ) -> AppResult<Message> {
        self.directory
            .get_for_participant(conversation_id, sender)
            .await?;
        outgoing.validate()?;

        let (content, uploaded) = self.build_content(outgoing).await?;

        let message = match self.messages.append(conversation_id, sender, content).await {
            Ok(message) => message,
            Err(e) => {
                self.rollback_uploads(&uploaded).await;
                return Err(e);
            }
        };

        let conversation = self
            .directory
            .update_preview_and_touch(conversation_id, &message.summary())
            .await?;

        MESSAGES_SENT.inc();
        info!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            sender_id = %sender,
            "message sent"
        );

        self.notifier.dispatch(
            conversation.participant_ids(),
            RealtimeEvent::NewMessage {
                message: message.clone(),
                conversation: conversation.summary(),
            },
        );
        Ok(message)
    }

    /// Upload attachments concurrently. On any failure every upload that did
    /// succeed is deleted before the error is returned.
    async fn build_content(
        &self,
        outgoing: OutgoingMessage,
    ) -> AppResult<(MessageContent, Vec<UploadedMedia>)> {
        let Some(media_kind) = MediaKind::for_content(outgoing.kind) else {
            let text = outgoing.text.unwrap_or_default();
            return Ok((MessageContent::Text { text }, Vec::new()));
        };

        let results = join_all(
            outgoing
                .attachments
                .iter()
                .map(|a| self.media.upload(media_kind, &a.file_name, a.bytes.clone())),
        )
        .await;

        let mut uploaded = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(media) => uploaded.push(media),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            warn!(error = %e, uploaded = uploaded.len(), "attachment upload failed, rolling back");
            self.rollback_uploads(&uploaded).await;
            return Err(e);
        }

        let mut urls: Vec<String> = uploaded.iter().map(|m| m.url.clone()).collect();
        let content = match outgoing.kind {
            ContentKind::Image => MessageContent::Image { urls },
            ContentKind::Video => MessageContent::Video { urls },
            ContentKind::Audio => MessageContent::Audio {
                url: urls.remove(0),
            },
            ContentKind::File => MessageContent::File {
                url: urls.remove(0),
                name: outgoing.attachments.first().map(|a| a.file_name.clone()),
            },
            ContentKind::Text => return Err(AppError::Internal),
        };
        Ok((content, uploaded))
    }

    async fn rollback_uploads(&self, uploaded: &[UploadedMedia]) {
        if uploaded.is_empty() {
            return;
        }
        let results = join_all(uploaded.iter().map(|m| self.media.delete(&m.id))).await;
        for (media, result) in uploaded.iter().zip(results) {
            match result {
                Ok(()) => MEDIA_ROLLBACKS.inc(),
                Err(e) => warn!(media_id = %media.id, error = %e, "media rollback failed"),
            }
        }
    }

    pub async fn recall_message(&self, message_id: Uuid, requester: &UserId) -> AppResult<Message> {
        let was_recalled = self.messages.get(message_id).await?.content.is_recalled();
        let message = self.messages.recall(message_id, requester).await?;

        self.directory
            .recall_preview(message.conversation_id, message.id)
            .await?;
        let conversation = self.directory.get(message.conversation_id).await?;

        if !was_recalled {
            MESSAGES_RECALLED.inc();
            info!(message_id = %message.id, conversation_id = %message.conversation_id, "message recalled");
        }

        self.notifier.dispatch(
            conversation.participant_ids(),
            RealtimeEvent::RecalledMessage {
                message: message.clone(),
                conversation: conversation.summary(),
            },
        );
        Ok(message)
    }

    /// Seen state is synced to the acting user's own sessions only
    pub async fn mark_conversation_seen(
        &self,
        conversation_id: Uuid,
        user: &UserId,
    ) -> AppResult<Conversation> {
        let conversation = self.directory.mark_seen(conversation_id, user).await?;
        self.notifier.dispatch(
            vec![user.clone()],
            RealtimeEvent::ConversationSeen { conversation_id },
        );
        Ok(conversation)
    }

    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        viewer: &UserId,
        skip: Option<usize>,
        limit: Option<usize>,
    ) -> AppResult<Vec<Message>> {
        let conversation = self.directory.get(conversation_id).await?;
        let watermark = self
            .directory
            .require_participant(&conversation, viewer)?
            .delete_watermark;
        let limit = limit
            .unwrap_or(DEFAULT_MESSAGE_PAGE)
            .clamp(1, self.page_limit_max);
        self.messages
            .list_visible(conversation_id, watermark, skip.unwrap_or(0), limit)
            .await
    }

    pub async fn clear_history(&self, conversation_id: Uuid, user: &UserId) -> AppResult<()> {
        self.directory.clear_history(conversation_id, user).await?;
        info!(conversation_id = %conversation_id, user_id = %user, "history cleared");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Conversations
    // ---------------------------------------------------------------------

    pub async fn find_or_create_direct(
        &self,
        user: &UserId,
        other: &UserId,
    ) -> AppResult<Conversation> {
        self.directory.find_or_create_direct(user, other).await
    }

    /// The creator is always a member
    pub async fn create_group(
        &self,
        creator: &UserId,
        others: Vec<UserId>,
        name: Option<String>,
        avatar_url: Option<String>,
    ) -> AppResult<Conversation> {
        let mut members = Vec::with_capacity(others.len() + 1);
        members.push(creator.clone());
        members.extend(others);

        let group = self.directory.create_group(members, name, avatar_url).await?;
        self.announce(&group, Vec::new(), MembershipChange::Created);
        Ok(group)
    }

    pub async fn get_conversation(
        &self,
        conversation_id: Uuid,
        user: &UserId,
    ) -> AppResult<ConversationView> {
        let conversation = self.directory.get_for_participant(conversation_id, user).await?;
        self.view_for(conversation, user).await
    }

    pub async fn list_conversations_for(
        &self,
        user: &UserId,
        skip: Option<usize>,
        limit: Option<usize>,
    ) -> AppResult<Vec<ConversationView>> {
        let limit = limit
            .unwrap_or(DEFAULT_CONVERSATION_PAGE)
            .clamp(1, self.page_limit_max);
        let conversations = self
            .directory
            .list_for_user(user, skip.unwrap_or(0), limit)
            .await?;

        let mut ids: Vec<UserId> = conversations
            .iter()
            .flat_map(|c| c.participants.iter().map(|p| p.user_id.clone()))
            .collect();
        ids.sort();
        ids.dedup();
        let profiles = self.lookup_profiles(&ids).await;

        Ok(conversations
            .into_iter()
            .map(|c| ConversationView::for_viewer(c, user, &profiles))
            .collect())
    }

    /// Viewer-specific projection with resolved participant profiles
    pub async fn view_for(
        &self,
        conversation: Conversation,
        viewer: &UserId,
    ) -> AppResult<ConversationView> {
        let profiles = self.lookup_profiles(&conversation.participant_ids()).await;
        Ok(ConversationView::for_viewer(conversation, viewer, &profiles))
    }

    /// Profiles only decorate the response; a failing user service degrades
    /// to placeholder profiles.
    async fn lookup_profiles(&self, ids: &[UserId]) -> HashMap<UserId, UserProfile> {
        match self.profiles.profiles(ids).await {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!(error = %e, "profile lookup failed, using placeholders");
                HashMap::new()
            }
        }
    }

    // ---------------------------------------------------------------------
    // Group membership
    // ---------------------------------------------------------------------

    pub async fn add_member(
        &self,
        conversation_id: Uuid,
        acting_user: &UserId,
        new_user: &UserId,
    ) -> AppResult<Conversation> {
        let conversation = self
            .directory
            .add_member(conversation_id, acting_user, new_user)
            .await?;
        self.announce(
            &conversation,
            Vec::new(),
            MembershipChange::MemberAdded {
                user_id: new_user.clone(),
            },
        );
        Ok(conversation)
    }

    pub async fn leave_group(&self, conversation_id: Uuid, user: &UserId) -> AppResult<Conversation> {
        let conversation = self.directory.remove_member(conversation_id, user).await?;
        if conversation.dissolved_at.is_some() {
            info!(conversation_id = %conversation_id, "group dissolved, last participant left");
        }
        // the leaver's other devices learn about it too
        self.announce(
            &conversation,
            vec![user.clone()],
            MembershipChange::MemberLeft {
                user_id: user.clone(),
            },
        );
        Ok(conversation)
    }

    pub async fn rename_group(
        &self,
        conversation_id: Uuid,
        acting_user: &UserId,
        name: &str,
    ) -> AppResult<Conversation> {
        let conversation = self.directory.rename(conversation_id, acting_user, name).await?;
        self.announce(&conversation, Vec::new(), MembershipChange::Renamed);
        Ok(conversation)
    }

    pub async fn set_group_avatar(
        &self,
        conversation_id: Uuid,
        acting_user: &UserId,
        url: Option<&str>,
    ) -> AppResult<Conversation> {
        let conversation = self
            .directory
            .set_avatar(conversation_id, acting_user, url)
            .await?;
        self.announce(&conversation, Vec::new(), MembershipChange::AvatarChanged);
        Ok(conversation)
    }

    pub async fn toggle_mute(
        &self,
        conversation_id: Uuid,
        user: &UserId,
        muted: bool,
    ) -> AppResult<Conversation> {
        self.directory.set_muted(conversation_id, user, muted).await
    }

    fn announce(&self, conversation: &Conversation, extra: Vec<UserId>, change: MembershipChange) {
        let mut recipients = conversation.participant_ids();
        recipients.extend(extra);
        self.notifier.dispatch(
            recipients,
            RealtimeEvent::ConversationUpdated {
                change,
                conversation: conversation.summary(),
            },
        );
    }
}
