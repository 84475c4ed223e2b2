pub mod conversation_directory;
pub mod conversation_service;
pub mod identity;
pub mod media;
pub mod message_store;
pub mod notifier;
pub mod profiles;

pub use conversation_directory::ConversationDirectory;
pub use conversation_service::{AttachmentUpload, ConversationService, OutgoingMessage};
pub use identity::{IdentityResolver, JwtIdentityResolver};
pub use media::{HttpMediaClient, MediaKind, MediaStore, UploadedMedia};
pub use message_store::MessageStore;
pub use notifier::{DeliveryReport, Notifier};
pub use profiles::{HttpProfileClient, ProfileDirectory};
