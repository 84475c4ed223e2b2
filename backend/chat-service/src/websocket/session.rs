use crate::config::WebSocketConfig;
use crate::models::UserId;
use crate::services::{ConversationService, IdentityResolver};
use crate::websocket::events::RealtimeEvent;
use crate::websocket::message_types::WsInboundEvent;
use crate::websocket::{ConnectionRegistry, OutboundFrame, SessionId};
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// One realtime connection of one user
pub struct WsSession {
    user_id: UserId,
    session_id: SessionId,
    registry: ConnectionRegistry,
    conversations: Arc<ConversationService>,
    identity: Arc<dyn IdentityResolver>,
    settings: WebSocketConfig,
    hb: Instant,
    // taken in `started`
    outbound: Option<UnboundedReceiver<OutboundFrame>>,
}

impl WsSession {
    pub fn new(
        user_id: UserId,
        session_id: SessionId,
        outbound: UnboundedReceiver<OutboundFrame>,
        registry: ConnectionRegistry,
        conversations: Arc<ConversationService>,
        identity: Arc<dyn IdentityResolver>,
        settings: WebSocketConfig,
    ) -> Self {
        Self {
            user_id,
            session_id,
            registry,
            conversations,
            identity,
            settings,
            hb: Instant::now(),
            outbound: Some(outbound),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.settings.client_timeout;
        ctx.run_interval(self.settings.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(user_id = %act.user_id, "websocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn force_close(&self, ctx: &mut ws::WebsocketContext<Self>, reason: String) {
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Policy,
            description: Some(reason),
        }));
        ctx.stop();
    }

    fn handle_inbound(&mut self, event: WsInboundEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match event {
            WsInboundEvent::Ping => match RealtimeEvent::Pong.to_frame() {
                Ok(frame) => ctx.text(&*frame),
                Err(e) => tracing::error!(error = %e, "failed to serialize pong"),
            },
            WsInboundEvent::MarkSeen { conversation_id } => {
                let conversations = self.conversations.clone();
                let user_id = self.user_id.clone();
                actix::spawn(async move {
                    if let Err(e) = conversations
                        .mark_conversation_seen(conversation_id, &user_id)
                        .await
                    {
                        tracing::debug!(
                            user_id = %user_id,
                            conversation_id = %conversation_id,
                            error = %e,
                            "mark_seen over websocket failed"
                        );
                    }
                });
            }
            WsInboundEvent::Reauthenticate { token } => match self.identity.resolve(&token) {
                Ok(user_id) if user_id == self.user_id => {
                    tracing::debug!(user_id = %self.user_id, "websocket session reauthenticated");
                }
                Ok(other) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        presented = %other,
                        "reauthentication for a different user, closing session"
                    );
                    self.force_close(ctx, "identity mismatch".into());
                }
                Err(_) => {
                    tracing::info!(user_id = %self.user_id, "reauthentication failed, closing session");
                    self.force_close(ctx, "authentication failed".into());
                }
            },
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "websocket session started");
        self.hb(ctx);
        if let Some(rx) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "websocket session stopped");

        let registry = self.registry.clone();
        let user_id = self.user_id.clone();
        let session_id = self.session_id;
        actix::spawn(async move {
            registry.unregister(&user_id, session_id).await;
        });
    }
}

// Frames pushed by the notifier or the registry
impl StreamHandler<OutboundFrame> for WsSession {
    fn handle(&mut self, frame: OutboundFrame, ctx: &mut Self::Context) {
        match frame {
            OutboundFrame::Event(payload) => ctx.text(&*payload),
            OutboundFrame::Close(reason) => self.force_close(ctx, reason),
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        // registry dropped this session
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match serde_json::from_str::<WsInboundEvent>(&text) {
                    Ok(event) => self.handle_inbound(event, ctx),
                    Err(e) => tracing::warn!(error = %e, "failed to parse websocket frame"),
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("binary websocket frames not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(?reason, "websocket close received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(error = %e, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}
