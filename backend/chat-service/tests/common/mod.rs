#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chat_service::config::Config;
use chat_service::error::{AppError, AppResult};
use chat_service::models::{UserId, UserProfile};
use chat_service::services::{IdentityResolver, MediaKind, MediaStore, ProfileDirectory, UploadedMedia};
use chat_service::state::{AppState, Backends};
use chat_service::storage::MemoryStore;
use chat_service::websocket::{OutboundFrame, SessionHandle};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Media service double: keeps uploaded objects in memory and fails uploads
/// whose file name is listed in `failing`.
#[derive(Default)]
pub struct FakeMediaStore {
    stored: Mutex<HashMap<String, UploadedMedia>>,
    failing: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeMediaStore {
    pub fn fail_uploads_named(&self, file_name: &str) {
        self.failing.lock().unwrap().push(file_name.to_string());
    }

    pub fn stored_count(&self) -> usize {
        self.stored.lock().unwrap().len()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaStore for FakeMediaStore {
    async fn upload(
        &self,
        kind: MediaKind,
        file_name: &str,
        _bytes: Bytes,
    ) -> AppResult<UploadedMedia> {
        // let siblings finish first so rollback has something to undo
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self.failing.lock().unwrap().iter().any(|f| f == file_name) {
            return Err(AppError::ServiceUnavailable("media service rejected upload".into()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let media = UploadedMedia {
            id: id.clone(),
            url: format!("https://cdn.test/{}/{id}/{file_name}", kind.as_str()),
        };
        self.stored.lock().unwrap().insert(id, media.clone());
        Ok(media)
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.stored.lock().unwrap().remove(id);
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

/// Profiles for every id, with a display name derived from it
pub struct StaticProfiles;

#[async_trait]
impl ProfileDirectory for StaticProfiles {
    async fn profiles(&self, ids: &[UserId]) -> AppResult<HashMap<UserId, UserProfile>> {
        Ok(ids
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    UserProfile {
                        id: id.clone(),
                        username: id.to_string(),
                        display_name: Some(format!("User {id}")),
                        avatar_url: None,
                    },
                )
            })
            .collect())
    }
}

/// Accepts `token-<user>` as the credential of `<user>`
pub struct StaticIdentity;

impl IdentityResolver for StaticIdentity {
    fn resolve(&self, token: &str) -> AppResult<UserId> {
        token
            .strip_prefix("token-")
            .filter(|id| !id.is_empty())
            .map(UserId::from)
            .ok_or(AppError::Unauthorized)
    }
}

pub fn bearer(user: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer token-{user}"))
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub media: Arc<FakeMediaStore>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let media = Arc::new(FakeMediaStore::default());
        let state = AppState::new(
            Config::for_tests(),
            Backends {
                conversations: store.clone(),
                messages: store.clone(),
                media: media.clone(),
                profiles: Arc::new(StaticProfiles),
                identity: Arc::new(StaticIdentity),
            },
        );
        Self {
            state,
            store,
            media,
        }
    }

    /// Open a fake realtime session for `user`
    pub async fn connect(&self, user: &str) -> UnboundedReceiver<OutboundFrame> {
        let (handle, rx) = SessionHandle::channel();
        self.state.registry.register(&UserId::from(user), handle).await;
        rx
    }
}

pub fn user(id: &str) -> UserId {
    UserId::from(id)
}

/// Next event pushed to a session, parsed as JSON
pub async fn next_event(rx: &mut UnboundedReceiver<OutboundFrame>) -> Value {
    match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(OutboundFrame::Event(frame))) => serde_json::from_str(&frame).unwrap(),
        other => panic!("expected an event frame, got {other:?}"),
    }
}

/// Asserts that nothing arrives within a short window
pub async fn assert_no_event(rx: &mut UnboundedReceiver<OutboundFrame>) {
    let received = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(received.is_err(), "unexpected frame: {received:?}");
}
