use crate::metrics::REALTIME_SESSIONS;
use crate::models::UserId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod events;
pub mod message_types;
pub mod session;

/// Unique identifier for one realtime session
///
/// A user may hold several sessions at once (one per device), each cleaned up
/// individually when its socket closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Frames pushed from the server side into a session actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Pre-serialized event, shared by every recipient of one broadcast
    Event(Arc<str>),
    /// Close the socket with the given reason
    Close(String),
}

/// Transport handle of a session as seen by the registry
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    sender: UnboundedSender<OutboundFrame>,
}

impl SessionHandle {
    /// New handle plus the receiving end the session actor drains
    pub fn channel() -> (Self, UnboundedReceiver<OutboundFrame>) {
        let (sender, rx) = unbounded_channel();
        (
            Self {
                id: SessionId::new(),
                sender,
            },
            rx,
        )
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Fails only when the session side has gone away
    pub fn send(&self, frame: OutboundFrame) -> Result<(), OutboundFrame> {
        self.sender.send(frame).map_err(|e| e.0)
    }
}

/// Live mapping from user identity to open realtime sessions
///
/// Explicitly constructed at startup and shared by the socket handler and
/// the notifier. Entries are dropped as soon as a user's last session leaves.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    // user -> live sessions
    inner: Arc<RwLock<HashMap<UserId, Vec<SessionHandle>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session for `user_id`. Returns false if the same session is
    /// already registered.
    pub async fn register(&self, user_id: &UserId, handle: SessionHandle) -> bool {
        let mut guard = self.inner.write().await;
        let sessions = guard.entry(user_id.clone()).or_default();
        if sessions.iter().any(|s| s.id == handle.id) {
            return false;
        }
        sessions.push(handle);
        REALTIME_SESSIONS.inc();

        tracing::debug!(
            user_id = %user_id,
            sessions = sessions.len(),
            "registered realtime session"
        );
        true
    }

    /// Remove one session; the user's entry goes away with its last session
    pub async fn unregister(&self, user_id: &UserId, session_id: SessionId) -> bool {
        let mut guard = self.inner.write().await;
        let Some(sessions) = guard.get_mut(user_id) else {
            return false;
        };

        let before = sessions.len();
        sessions.retain(|s| s.id != session_id);
        let removed = before != sessions.len();
        if removed {
            REALTIME_SESSIONS.dec();
            tracing::debug!(
                user_id = %user_id,
                remaining = sessions.len(),
                "unregistered realtime session"
            );
        }

        if sessions.is_empty() {
            guard.remove(user_id);
        }
        removed
    }

    /// Snapshot of a user's sessions. Sessions registered after the snapshot
    /// miss whatever is sent with it.
    pub async fn sessions_of(&self, user_id: &UserId) -> Vec<SessionHandle> {
        let guard = self.inner.read().await;
        guard.get(user_id).cloned().unwrap_or_default()
    }

    /// Ask every session of `user_id` to close. The sessions unregister
    /// themselves once their actors stop.
    pub async fn close_user_sessions(&self, user_id: &UserId, reason: &str) -> usize {
        let sessions = self.sessions_of(user_id).await;
        sessions
            .iter()
            .filter(|s| s.send(OutboundFrame::Close(reason.to_string())).is_ok())
            .count()
    }

    /// Close every live session; used at shutdown
    pub async fn close_all(&self, reason: &str) {
        let snapshot: Vec<SessionHandle> = {
            let guard = self.inner.read().await;
            guard.values().flatten().cloned().collect()
        };
        for session in snapshot {
            let _ = session.send(OutboundFrame::Close(reason.to_string()));
        }
    }

    pub async fn session_count(&self, user_id: &UserId) -> usize {
        let guard = self.inner.read().await;
        guard.get(user_id).map(|v| v.len()).unwrap_or(0)
    }

    /// Number of users with at least one live session
    pub async fn user_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_is_idempotent_per_session() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("u1");
        let (handle, _rx) = SessionHandle::channel();

        assert!(registry.register(&user, handle.clone()).await);
        assert!(!registry.register(&user, handle).await);
        assert_eq!(registry.session_count(&user).await, 1);
    }

    #[tokio::test]
    async fn test_multiple_devices_and_empty_entry_cleanup() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("u1");
        let (phone, _rx1) = SessionHandle::channel();
        let (laptop, _rx2) = SessionHandle::channel();

        registry.register(&user, phone.clone()).await;
        registry.register(&user, laptop.clone()).await;
        assert_eq!(registry.sessions_of(&user).await.len(), 2);

        assert!(registry.unregister(&user, phone.id()).await);
        assert_eq!(registry.user_count().await, 1);

        assert!(registry.unregister(&user, laptop.id()).await);
        assert_eq!(registry.user_count().await, 0);
        assert!(registry.sessions_of(&user).await.is_empty());

        assert!(!registry.unregister(&user, laptop.id()).await);
    }

    #[tokio::test]
    async fn test_close_user_sessions_sends_close_frame() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("u1");
        let (handle, mut rx) = SessionHandle::channel();
        registry.register(&user, handle).await;

        assert_eq!(registry.close_user_sessions(&user, "token revoked").await, 1);
        assert_eq!(
            rx.recv().await,
            Some(OutboundFrame::Close("token revoked".to_string()))
        );
    }

    #[tokio::test]
    async fn test_concurrent_register_unregister() {
        let registry = ConnectionRegistry::new();
        let user = UserId::from("u1");

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            let user = user.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, _rx) = SessionHandle::channel();
                let id = handle.id();
                registry.register(&user, handle).await;
                registry.unregister(&user, id).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(registry.user_count().await, 0);
    }
}
