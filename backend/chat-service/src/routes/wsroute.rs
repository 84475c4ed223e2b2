use crate::middleware::guards::bearer_token;
use crate::state::AppState;
use crate::websocket::session::WsSession;
use crate::websocket::SessionHandle;
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// GET /ws?token=...
///
/// Resolves the caller, registers the session, then upgrades. Events for the
/// user are pushed until either side closes.
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let token = query
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&req));

    let Some(token) = token else {
        tracing::warn!("websocket connection rejected: no token");
        return Ok(HttpResponse::Unauthorized().finish());
    };
    let user_id = match state.identity.resolve(token) {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!(error = %e, "websocket connection rejected: invalid token");
            return Ok(HttpResponse::Unauthorized().finish());
        }
    };

    let (handle, rx) = SessionHandle::channel();
    let session_id = handle.id();
    state.registry.register(&user_id, handle).await;

    let session = WsSession::new(
        user_id.clone(),
        session_id,
        rx,
        state.registry.clone(),
        state.conversations.clone(),
        state.identity.clone(),
        state.config.websocket.clone(),
    );

    match ws::start(session, &req, stream) {
        Ok(response) => Ok(response),
        Err(e) => {
            // handshake failed, the actor never started
            state.registry.unregister(&user_id, session_id).await;
            Err(e)
        }
    }
}
