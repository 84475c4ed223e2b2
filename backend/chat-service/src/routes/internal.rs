//! Service-to-service passthrough so the post and friend-graph services can
//! reach connected clients through the notifier.

use crate::{error::AppError, models::UserId, state::AppState, websocket::events::RealtimeEvent};
use actix_web::{post, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const INTERNAL_TOKEN_HEADER: &str = "X-Internal-Token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalEventKind {
    NewPost,
    FriendRequestReceived,
    FriendRequestAccepted,
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub user_ids: Vec<UserId>,
    pub event: ExternalEventKind,
    pub payload: Value,
}

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub delivered: usize,
    pub failed: usize,
}

impl NotifyRequest {
    fn into_event(self) -> (Vec<UserId>, RealtimeEvent) {
        let event = match self.event {
            ExternalEventKind::NewPost => RealtimeEvent::NewPost { post: self.payload },
            ExternalEventKind::FriendRequestReceived => RealtimeEvent::FriendRequestReceived {
                request: self.payload,
            },
            ExternalEventKind::FriendRequestAccepted => RealtimeEvent::FriendRequestAccepted {
                request: self.payload,
            },
        };
        (self.user_ids, event)
    }
}

/// Compare digests so the check does not short-circuit on the first differing byte
fn token_matches(presented: &str, expected: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}

/// POST /internal/notify
///
/// 404 when no internal token is configured, 401 on a wrong token.
#[post("/internal/notify")]
pub async fn notify(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<NotifyRequest>,
) -> Result<HttpResponse, AppError> {
    let Some(expected) = state.config.internal_api_token.as_deref() else {
        return Ok(HttpResponse::NotFound().finish());
    };

    let presented = req
        .headers()
        .get(INTERNAL_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    if !token_matches(presented, expected) {
        tracing::warn!("internal notify rejected: bad token");
        return Err(AppError::Unauthorized);
    }

    let (user_ids, event) = body.into_inner().into_event();
    let report = state
        .conversations
        .notifier()
        .broadcast(&user_ids, &event)
        .await;

    Ok(HttpResponse::Accepted().json(NotifyResponse {
        delivered: report.delivered,
        failed: report.failed,
    }))
}
