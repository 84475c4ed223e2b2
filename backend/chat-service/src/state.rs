use crate::{
    config::Config,
    services::{
        ConversationDirectory, ConversationService, IdentityResolver, MediaStore, MessageStore,
        Notifier, ProfileDirectory,
    },
    storage::{ConversationStore, MessageLog},
    websocket::ConnectionRegistry,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: ConnectionRegistry,
    pub conversations: Arc<ConversationService>,
    pub identity: Arc<dyn IdentityResolver>,
}

/// Collaborators the service is assembled from
pub struct Backends {
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageLog>,
    pub media: Arc<dyn MediaStore>,
    pub profiles: Arc<dyn ProfileDirectory>,
    pub identity: Arc<dyn IdentityResolver>,
}

impl AppState {
    pub fn new(config: Config, backends: Backends) -> Self {
        let registry = ConnectionRegistry::new();
        let service = ConversationService::new(
            ConversationDirectory::new(backends.conversations),
            MessageStore::new(backends.messages),
            Notifier::new(registry.clone()),
            backends.media,
            backends.profiles,
            config.message_page_limit_max,
        );
        Self {
            config: Arc::new(config),
            registry,
            conversations: Arc::new(service),
            identity: backends.identity,
        }
    }
}
