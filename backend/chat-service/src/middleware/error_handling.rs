use crate::error::{AppError, ForbiddenReason, Resource};
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as kinds, ErrorResponse};

/// Map a domain error onto the shared error envelope
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::Validation(_) => (kinds::VALIDATION_ERROR, error_codes::INVALID_REQUEST),
        AppError::Unauthorized => (kinds::AUTHENTICATION_ERROR, error_codes::TOKEN_INVALID),
        AppError::Forbidden(ForbiddenReason::NotParticipant) => (
            kinds::AUTHORIZATION_ERROR,
            error_codes::NOT_CONVERSATION_MEMBER,
        ),
        AppError::Forbidden(ForbiddenReason::NotSender) => {
            (kinds::AUTHORIZATION_ERROR, error_codes::NOT_MESSAGE_SENDER)
        }
        AppError::NotFound(Resource::Conversation) => {
            (kinds::NOT_FOUND_ERROR, error_codes::CONVERSATION_NOT_FOUND)
        }
        AppError::NotFound(Resource::Message) => {
            (kinds::NOT_FOUND_ERROR, error_codes::MESSAGE_NOT_FOUND)
        }
        AppError::Database(_) => (kinds::SERVER_ERROR, error_codes::DATABASE_ERROR),
        AppError::ServiceUnavailable(_) => (
            kinds::SERVICE_UNAVAILABLE_ERROR,
            error_codes::SERVICE_UNAVAILABLE,
        ),
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
            (kinds::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR)
        }
    };

    // Dependency details stay in the logs
    let message = match err {
        AppError::Database(_) | AppError::Config(_) | AppError::StartServer(_) => {
            "internal server error".to_string()
        }
        other => other.to_string(),
    };

    let response = ErrorResponse::new(
        ErrorResponse::reason_for(status.as_u16()),
        &message,
        status.as_u16(),
        error_type,
        code,
    );

    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    if err.status_code() >= 500 {
        tracing::error!(error = %err, retryable = err.is_retryable(), "request failed");
    }
    let (status, response) = map_error(err);
    HttpResponse::build(status).json(response)
}
