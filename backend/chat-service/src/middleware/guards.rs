//! Request extractors that resolve the caller's identity before a handler runs

use crate::error::AppError;
use crate::models::UserId;
use crate::state::AppState;
use actix_web::{http::header, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};

/// Authenticated caller, resolved from `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
}

pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequest for User {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let result = (|| -> Result<User, AppError> {
            let state = req
                .app_data::<web::Data<AppState>>()
                .ok_or(AppError::Internal)?;
            let token = bearer_token(req).ok_or(AppError::Unauthorized)?;
            let id = state.identity.resolve(token)?;
            Ok(User { id })
        })();
        ready(result)
    }
}
