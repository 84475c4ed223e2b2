use crate::{
    error::AppError, middleware::guards::User, models::UserId, state::AppState,
};
use actix_web::{get, post, put, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    /// Other participants; the caller is added implicitly
    #[serde(default)]
    pub participant_ids: Vec<UserId>,
    #[serde(default)]
    pub is_group: bool,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

/// POST /conversations
/// Find-or-create a direct conversation, or create a group
#[post("/conversations")]
pub async fn create_conversation(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreateConversationRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let mut others: Vec<UserId> = body
        .participant_ids
        .into_iter()
        .filter(|id| id != &user.id)
        .collect();

    if body.is_group {
        let group = state
            .conversations
            .create_group(&user.id, others, body.name, body.avatar_url)
            .await?;
        let view = state.conversations.view_for(group, &user.id).await?;
        return Ok(HttpResponse::Created().json(view));
    }

    // repeated ids name the same participant
    others.sort();
    others.dedup();
    let [other] = others.as_slice() else {
        return Err(AppError::Validation(
            "a direct conversation needs exactly one other participant".into(),
        ));
    };
    let conversation = state
        .conversations
        .find_or_create_direct(&user.id, other)
        .await?;
    let view = state.conversations.view_for(conversation, &user.id).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// GET /conversations
#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: User,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let views = state
        .conversations
        .list_conversations_for(&user.id, query.skip, query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(views))
}

/// GET /conversations/{id}
#[get("/conversations/{id}")]
pub async fn get_conversation(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let view = state
        .conversations
        .get_conversation(conversation_id.into_inner(), &user.id)
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// POST /conversations/{id}/seen
#[post("/conversations/{id}/seen")]
pub async fn mark_seen(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state
        .conversations
        .mark_conversation_seen(conversation_id.into_inner(), &user.id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /conversations/{id}/clear
/// Hide the history up to now for the caller only
#[post("/conversations/{id}/clear")]
pub async fn clear_history(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state
        .conversations
        .clear_history(conversation_id.into_inner(), &user.id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// PUT /conversations/{id}/mute
#[put("/conversations/{id}/mute")]
pub async fn set_mute(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<MuteRequest>,
) -> Result<HttpResponse, AppError> {
    let conversation = state
        .conversations
        .toggle_mute(conversation_id.into_inner(), &user.id, body.muted)
        .await?;
    let view = state.conversations.view_for(conversation, &user.id).await?;
    Ok(HttpResponse::Ok().json(view))
}
