//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Errors render as
//! `{"error": CODE}` with a stable code string; server-side failures are
//! captured to Sentry before responding and never leak details to the client.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use threadline_core::CommerceError;

use crate::db::RepositoryError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// A domain rule rejected the request.
    #[error(transparent)]
    Commerce(#[from] CommerceError),

    /// Storage operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Malformed body or missing required field.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No authenticated user.
    #[error("Unauthorized")]
    Unauthorized,

    /// Authenticated user lacks the required role.
    #[error("Forbidden")]
    Forbidden,

    /// A read-modify-write kept losing to concurrent writers.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable code rendered in the response body.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Commerce(err) => err.code(),
            Self::Database(RepositoryError::NotFound) => "NOT_FOUND",
            Self::Database(RepositoryError::Conflict(_)) | Self::Conflict(_) => "CONFLICT",
            Self::Database(_) | Self::Internal(_) => "SERVER_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Commerce(err) => match err {
                CommerceError::NotFound | CommerceError::NotInCart | CommerceError::CartEmpty => {
                    StatusCode::NOT_FOUND
                }
                CommerceError::Forbidden => StatusCode::FORBIDDEN,
                CommerceError::BadLine
                | CommerceError::BadQty
                | CommerceError::BadProduct
                | CommerceError::OptionRequired
                | CommerceError::NoItems
                | CommerceError::AmountMismatch { .. }
                | CommerceError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            },
            Self::Database(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            Self::Database(RepositoryError::Conflict(_)) | Self::Conflict(_) => {
                StatusCode::CONFLICT
            }
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, code = self.code(), "Request rejected");
        }

        (status, Json(json!({ "error": self.code() }))).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Called once the caller is authenticated so that errors are associated with
/// the user.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}
