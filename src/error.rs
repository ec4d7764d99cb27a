use axum::{http::StatusCode, response::{IntoResponse, Response}};
use thiserror::Error;

use crate::entitlements::EntitlementError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("temporarily unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Message(String),
}

impl From<EntitlementError> for AppError {
    fn from(err: EntitlementError) -> Self {
        match err {
            EntitlementError::AccountNotFound(_) => AppError::NotFound,
            EntitlementError::InvalidRequest(message) => AppError::BadRequest(message),
            EntitlementError::Database(db) => AppError::Db(db),
            // A retried-out ledger race is a service hiccup; it must never
            // surface to the user as a quota decision.
            race @ EntitlementError::ConcurrentModification(_) => {
                AppError::Unavailable(race.to_string())
            }
            // Directory/configuration integrity errors propagate untouched.
            integrity => AppError::Message(integrity.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Db(_) | AppError::Message(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(?self);
        (status, self.to_string()).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
