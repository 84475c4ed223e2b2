use crate::{
    error::AppError,
    middleware::guards::User,
    models::ContentKind,
    routes::conversations::PageQuery,
    services::{AttachmentUpload, OutgoingMessage},
    state::AppState,
};
use actix_web::{get, post, web, HttpResponse};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AttachmentBody {
    pub file_name: String,
    /// Base64 (standard alphabet) file contents
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentBody>,
}

impl SendMessageRequest {
    fn into_outgoing(self) -> Result<OutgoingMessage, AppError> {
        let kind: ContentKind = self.kind.parse()?;
        let attachments = self
            .attachments
            .into_iter()
            .map(|a| {
                let bytes = STANDARD.decode(a.data.as_bytes()).map_err(|e| {
                    AppError::Validation(format!("attachment {} is not base64: {e}", a.file_name))
                })?;
                Ok(AttachmentUpload {
                    file_name: a.file_name,
                    bytes: Bytes::from(bytes),
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(OutgoingMessage {
            kind,
            text: self.text,
            attachments,
        })
    }
}

/// POST /conversations/{id}/messages
#[post("/conversations/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let outgoing = body.into_inner().into_outgoing()?;
    let message = state
        .conversations
        .send_message(&user.id, conversation_id.into_inner(), outgoing)
        .await?;
    Ok(HttpResponse::Created().json(message))
}

/// GET /conversations/{id}/messages?skip=&limit=
/// Oldest first within the page; the caller's cleared history is hidden
#[get("/conversations/{id}/messages")]
pub async fn list_messages(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let messages = state
        .conversations
        .list_messages(conversation_id.into_inner(), &user.id, query.skip, query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// POST /messages/{id}/recall
#[post("/messages/{id}/recall")]
pub async fn recall_message(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .conversations
        .recall_message(message_id.into_inner(), &user.id)
        .await?;
    Ok(HttpResponse::Ok().json(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_attachments() {
        let request = SendMessageRequest {
            kind: "image".into(),
            text: None,
            attachments: vec![AttachmentBody {
                file_name: "a.png".into(),
                data: STANDARD.encode(b"png-bytes"),
            }],
        };
        let outgoing = request.into_outgoing().unwrap();
        assert_eq!(outgoing.kind, ContentKind::Image);
        assert_eq!(&outgoing.attachments[0].bytes[..], b"png-bytes");
    }

    #[test]
    fn test_rejects_unknown_kind_and_bad_base64() {
        let unknown = SendMessageRequest {
            kind: "sticker".into(),
            text: None,
            attachments: vec![],
        };
        assert!(matches!(unknown.into_outgoing(), Err(AppError::Validation(_))));

        let bad = SendMessageRequest {
            kind: "file".into(),
            text: None,
            attachments: vec![AttachmentBody {
                file_name: "a.pdf".into(),
                data: "%%%".into(),
            }],
        };
        assert!(matches!(bad.into_outgoing(), Err(AppError::Validation(_))));
    }
}
