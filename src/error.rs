//! # Errors
//! Typed failures for each layer and their mapping onto HTTP responses.
//!
//! Every error leaves the service as `{"message": "..."}`. Internal causes are
//! logged and replaced by a generic `Server error`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Failure raised by the symptom matcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredictError {
    /// No usable symptoms or too many of them.
    #[error("{0}")]
    InvalidInput(String),
}

/// Failure raised by the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique field (`username`, `email`) is already taken.
    #[error("{field} already exists")]
    Duplicate { field: &'static str },

    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// An edit applied under the store lock refused the current document.
    #[error("{0}")]
    Rejected(Box<AppError>),
}

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PredictError> for AppError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::InvalidInput(msg) => AppError::InvalidInput(msg),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { field: "username" } => {
                AppError::invalid("Username already exists")
            }
            StoreError::Duplicate { field: "email" } => AppError::invalid("Email already exists"),
            StoreError::Duplicate { field } => AppError::invalid(format!("{field} already exists")),
            StoreError::Rejected(err) => *err,
            other => AppError::Internal(other.into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(cause) => {
                error!(target: "healthtrack::api", error = ?cause, "request failed");
                "Server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}
