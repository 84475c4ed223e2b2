use super::message::MessageSummary;
use super::user::{UserId, UserProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

/// Canonical key of a direct conversation: hash of the sorted participant pair.
///
/// Order-independent, so `direct_key(a, b) == direct_key(b, a)`. The storage
/// layer holds a unique index on this key for non-group conversations.
pub fn direct_key(a: &UserId, b: &UserId) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    for id in [first, second] {
        // length prefix keeps the encoding injective for arbitrary id bytes
        hasher.update((id.as_str().len() as u64).to_be_bytes());
        hasher.update(id.as_str().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Per-conversation, per-user membership state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantState {
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    pub muted: bool,
    /// Messages created at or before this instant are hidden from this participant
    pub delete_watermark: Option<DateTime<Utc>>,
}

impl ParticipantState {
    pub fn new(user_id: UserId, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            joined_at,
            muted: false,
            delete_watermark: None,
        }
    }

    /// Whether a message created at `created_at` is hidden by the watermark
    pub fn hides(&self, created_at: DateTime<Utc>) -> bool {
        self.delete_watermark
            .map(|watermark| created_at <= watermark)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub is_group: bool,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    /// Ordered set, unique by `user_id`
    pub participants: Vec<ParticipantState>,
    pub last_message: Option<MessageSummary>,
    /// Users that acknowledged `last_message`
    pub seen_by: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once the last participant has left a group
    pub dissolved_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn new_direct(a: UserId, b: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            is_group: false,
            name: None,
            avatar_url: None,
            participants: vec![ParticipantState::new(a, now), ParticipantState::new(b, now)],
            last_message: None,
            seen_by: Vec::new(),
            created_at: now,
            updated_at: now,
            dissolved_at: None,
        }
    }

    /// Caller guarantees `members` is already deduplicated
    pub fn new_group(
        members: Vec<UserId>,
        name: Option<String>,
        avatar_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            is_group: true,
            name,
            avatar_url,
            participants: members
                .into_iter()
                .map(|user_id| ParticipantState::new(user_id, now))
                .collect(),
            last_message: None,
            seen_by: Vec::new(),
            created_at: now,
            updated_at: now,
            dissolved_at: None,
        }
    }

    pub fn participant(&self, user_id: &UserId) -> Option<&ParticipantState> {
        self.participants.iter().find(|p| &p.user_id == user_id)
    }

    pub fn has_participant(&self, user_id: &UserId) -> bool {
        self.participant(user_id).is_some()
    }

    pub fn participant_ids(&self) -> Vec<UserId> {
        self.participants.iter().map(|p| p.user_id.clone()).collect()
    }

    /// Non-group with exactly the participants `a` and `b`
    pub fn is_direct_between(&self, a: &UserId, b: &UserId) -> bool {
        match (self.is_group, self.participants.as_slice()) {
            (false, [x, y]) => {
                (&x.user_id == a && &y.user_id == b) || (&x.user_id == b && &y.user_id == a)
            }
            _ => false,
        }
    }

    /// Canonical dedup key; `None` for groups
    pub fn direct_key(&self) -> Option<String> {
        match (self.is_group, self.participants.as_slice()) {
            (false, [a, b]) => Some(direct_key(&a.user_id, &b.user_id)),
            _ => None,
        }
    }

    /// Snapshot broadcast with realtime events; identical for every recipient
    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id,
            is_group: self.is_group,
            name: self.name.clone(),
            avatar_url: self.avatar_url.clone(),
            participant_ids: self.participant_ids(),
            last_message: self.last_message.clone(),
            seen_by: self.seen_by.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Participant-neutral conversation snapshot (no per-user watermarks)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub is_group: bool,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub participant_ids: Vec<UserId>,
    pub last_message: Option<MessageSummary>,
    pub seen_by: Vec<UserId>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantView {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub joined_at: DateTime<Utc>,
}

/// A conversation as seen by one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationView {
    pub id: Uuid,
    pub is_group: bool,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub participants: Vec<ParticipantView>,
    pub last_message: Option<MessageSummary>,
    pub seen_by: Vec<UserId>,
    pub muted: bool,
    pub updated_at: DateTime<Utc>,
}

impl ConversationView {
    /// Build the viewer's projection. The preview is suppressed when it falls
    /// at or before the viewer's own delete watermark.
    pub fn for_viewer(
        conversation: Conversation,
        viewer: &UserId,
        profiles: &HashMap<UserId, UserProfile>,
    ) -> Self {
        let own_state = conversation.participant(viewer).cloned();
        let last_message = conversation.last_message.filter(|summary| {
            own_state
                .as_ref()
                .map(|state| !state.hides(summary.created_at))
                .unwrap_or(true)
        });

        let participants = conversation
            .participants
            .into_iter()
            .map(|p| ParticipantView {
                profile: profiles
                    .get(&p.user_id)
                    .cloned()
                    .unwrap_or_else(|| UserProfile::placeholder(&p.user_id)),
                joined_at: p.joined_at,
            })
            .collect();

        Self {
            id: conversation.id,
            is_group: conversation.is_group,
            name: conversation.name,
            avatar_url: conversation.avatar_url,
            participants,
            last_message,
            seen_by: conversation.seen_by,
            muted: own_state.map(|s| s.muted).unwrap_or(false),
            updated_at: conversation.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageContent;
    use chrono::Duration;

    #[test]
    fn test_direct_key_is_order_independent() {
        let a = UserId::from("u1");
        let b = UserId::from("u2");
        assert_eq!(direct_key(&a, &b), direct_key(&b, &a));
        assert_ne!(direct_key(&a, &b), direct_key(&a, &UserId::from("u3")));
    }

    #[test]
    fn test_direct_key_separates_ids() {
        // "ab" + "c" must not collide with "a" + "bc"
        assert_ne!(
            direct_key(&UserId::from("ab"), &UserId::from("c")),
            direct_key(&UserId::from("a"), &UserId::from("bc"))
        );
        // ids may contain any byte, separators included
        assert_ne!(
            direct_key(&UserId::from("a\u{1f}b"), &UserId::from("c")),
            direct_key(&UserId::from("a"), &UserId::from("b\u{1f}c"))
        );
    }

    #[test]
    fn test_is_direct_between() {
        let direct = Conversation::new_direct(UserId::from("a\u{1f}b"), UserId::from("c"), Utc::now());
        assert!(direct.is_direct_between(&UserId::from("c"), &UserId::from("a\u{1f}b")));
        assert!(!direct.is_direct_between(&UserId::from("a"), &UserId::from("b\u{1f}c")));

        let group = Conversation::new_group(
            vec![UserId::from("a"), UserId::from("b")],
            None,
            None,
            Utc::now(),
        );
        assert!(!group.is_direct_between(&UserId::from("a"), &UserId::from("b")));
    }

    #[test]
    fn test_group_has_no_direct_key() {
        let group = Conversation::new_group(
            vec![UserId::from("u1"), UserId::from("u2")],
            Some("team".into()),
            None,
            Utc::now(),
        );
        assert_eq!(group.direct_key(), None);

        let direct = Conversation::new_direct(UserId::from("u2"), UserId::from("u1"), Utc::now());
        assert_eq!(
            direct.direct_key(),
            Some(direct_key(&UserId::from("u1"), &UserId::from("u2")))
        );
    }

    #[test]
    fn test_watermark_hides_inclusive() {
        let now = Utc::now();
        let mut state = ParticipantState::new(UserId::from("u1"), now);
        assert!(!state.hides(now));

        state.delete_watermark = Some(now);
        assert!(state.hides(now));
        assert!(state.hides(now - Duration::seconds(1)));
        assert!(!state.hides(now + Duration::milliseconds(1)));
    }

    #[test]
    fn test_view_suppresses_preview_behind_watermark() {
        let now = Utc::now();
        let u1 = UserId::from("u1");
        let u2 = UserId::from("u2");
        let mut conversation = Conversation::new_direct(u1.clone(), u2.clone(), now);
        conversation.last_message = Some(MessageSummary {
            message_id: Uuid::new_v4(),
            sender_id: u1.clone(),
            content: MessageContent::Text { text: "hi".into() },
            created_at: now,
        });
        conversation.participants[1].delete_watermark = Some(now);

        let profiles = HashMap::new();
        let for_u1 = ConversationView::for_viewer(conversation.clone(), &u1, &profiles);
        let for_u2 = ConversationView::for_viewer(conversation, &u2, &profiles);

        assert!(for_u1.last_message.is_some());
        assert!(for_u2.last_message.is_none());
        assert_eq!(for_u2.participants[0].profile.username, "u1");
    }
}
