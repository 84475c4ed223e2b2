//! Group management endpoints
//!
//! Any current participant may add members, rename or change the avatar;
//! there is no admin role. Direct conversations reject these with 400.

use crate::{error::AppError, middleware::guards::User, models::UserId, state::AppState};
use actix_web::{delete, patch, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    /// Empty string removes the avatar
    pub avatar_url: Option<String>,
}

/// POST /conversations/{id}/members
#[post("/conversations/{id}/members")]
pub async fn add_member(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<AddMemberRequest>,
) -> Result<HttpResponse, AppError> {
    let conversation = state
        .conversations
        .add_member(conversation_id.into_inner(), &user.id, &body.user_id)
        .await?;
    let view = state.conversations.view_for(conversation, &user.id).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// DELETE /conversations/{id}/members/me
#[delete("/conversations/{id}/members/me")]
pub async fn leave_group(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state
        .conversations
        .leave_group(conversation_id.into_inner(), &user.id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// PATCH /conversations/{id}
#[patch("/conversations/{id}")]
pub async fn update_group(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<UpdateGroupRequest>,
) -> Result<HttpResponse, AppError> {
    let conversation_id = conversation_id.into_inner();
    let body = body.into_inner();
    if body.name.is_none() && body.avatar_url.is_none() {
        return Err(AppError::Validation("nothing to update".into()));
    }

    let mut conversation = None;
    if let Some(name) = body.name.as_deref() {
        conversation = Some(
            state
                .conversations
                .rename_group(conversation_id, &user.id, name)
                .await?,
        );
    }
    if let Some(url) = body.avatar_url.as_deref() {
        let url = Some(url.trim()).filter(|u| !u.is_empty());
        conversation = Some(
            state
                .conversations
                .set_group_avatar(conversation_id, &user.id, url)
                .await?,
        );
    }

    let conversation = conversation.ok_or(AppError::Internal)?;
    let view = state.conversations.view_for(conversation, &user.id).await?;
    Ok(HttpResponse::Ok().json(view))
}
