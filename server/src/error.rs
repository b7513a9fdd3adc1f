//! Error types for the realtime notification server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Why a connection (or a REST caller) was refused.
///
/// The `Display` text is exactly what a rejected socket receives in its
/// single `channel-error` event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication token")]
    MissingCredential,

    #[error("Missing user ID")]
    MissingIdentity,

    /// Bad signature, malformed token or expired token.
    #[error("Invalid or expired token")]
    InvalidSignature { expired: bool },

    #[error("Invalid token for this user")]
    IdentityMismatch,
}

/// A collaborator (store) call failed. Recoverable: the session stays joined.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("notification not found: {0}")]
    NotFound(String),

    #[error("store call timed out")]
    Timeout,
}

/// Errors surfaced by the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not authenticated")]
    Unauthorized(#[from] AuthError),

    #[error("Not authorized to access notifications of other users")]
    Forbidden,

    #[error("Notification not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("Server error")]
    Store(#[source] StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Store(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(e) => {
                tracing::error!("store error: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
