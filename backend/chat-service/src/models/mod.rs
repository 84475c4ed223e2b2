pub mod conversation;
pub mod message;
pub mod user;

pub use conversation::{
    direct_key, Conversation, ConversationSummary, ConversationView, ParticipantState,
    ParticipantView,
};
pub use message::{ContentKind, Message, MessageContent, MessageSummary, PendingMessage};
pub use user::{UserId, UserProfile};

use chrono::{DateTime, SubsecRound, Utc};

/// Current time at the precision the database keeps (microseconds), so a
/// record handed back to callers equals the one read back later.
pub fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
