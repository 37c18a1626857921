use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::storage::{Rejection, StorageError};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable or answered nonsense.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// A game rule refused the operation.
    #[error("rejected: {0}")]
    Rejected(Rejection),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The word is not one letter away from the current word.
    #[error("`{candidate}` is not a valid move from `{current}`")]
    InvalidMove { current: String, candidate: String },
    /// The connection is not attached to the game it acts on.
    #[error("not attached to game `{0}`")]
    NotInGame(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl ServiceError {
    /// Machine-readable sub-reason carried by websocket error frames.
    pub fn reason(&self) -> &'static str {
        match self {
            ServiceError::Unavailable(_) => "server_error",
            ServiceError::Rejected(rejection) => rejection.code(),
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::InvalidMove { .. } => "invalid_move",
            ServiceError::NotInGame(_) => "not_in_game",
            ServiceError::NotFound(_) => "game_not_found",
            ServiceError::Unauthorized(_) => "unauthorized",
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Rejected(rejection) => ServiceError::Rejected(rejection),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<Rejection> for ServiceError {
    fn from(rejection: Rejection) -> Self {
        ServiceError::Rejected(rejection)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Missing or unusable identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Authenticated, but not allowed to touch the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Storage backend unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Rejected(rejection) => match rejection {
                Rejection::InvalidCode | Rejection::CannotJoinOwnGame => {
                    AppError::BadRequest(rejection.code().into())
                }
                Rejection::GameNotFound => AppError::NotFound(rejection.code().into()),
                Rejection::NotGameOwner => AppError::Forbidden(rejection.code().into()),
                _ => AppError::Conflict(rejection.code().into()),
            },
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            err @ ServiceError::InvalidMove { .. } => AppError::BadRequest(err.to_string()),
            err @ ServiceError::NotInGame(_) => AppError::Conflict(err.to_string()),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
