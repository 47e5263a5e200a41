//! Unified error handling with Sentry integration.
//!
//! Every JSON response uses the same envelope:
//!
//! ```json
//! { "success": true, "data": { ... } }
//! { "success": false, "error": "CREDENTIAL_REVOKED" }
//! ```
//!
//! Expected rejections map to 4xx with their machine-readable code. Store and
//! codec failures are captured to Sentry and masked as `INTERNAL_ERROR`.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use miniapp_core::{CodecError, Rejection, RejectionClass, StoreError};
use serde::Serialize;
use thiserror::Error;

use crate::services::auth::AuthError;

/// Response envelope shared by success and failure responses.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// A successful JSON response wrapped in the envelope.
#[derive(Debug)]
pub struct ApiResponse<T>(pub T);

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(Envelope {
            success: true,
            data: Some(self.0),
            error: None,
        })
        .into_response()
    }
}

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// An expected authentication or authorization failure.
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),

    /// Storage backend failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Credential issuance failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request body or parameters could not be interpreted.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited {
        /// Seconds until the current window resets.
        retry_after_secs: u64,
    },

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Rejected(rejection) => Self::Rejected(rejection),
            AuthError::Store(e) => Self::Store(e),
            AuthError::Codec(e) => Self::Codec(e),
        }
    }
}

impl AppError {
    /// Machine-readable code placed in the envelope.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Rejected(rejection) => rejection.code(),
            Self::Store(StoreError::NotFound) | Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "INVALID_REQUEST",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Store(_) | Self::Codec(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Rejected(rejection) => match rejection.class() {
                RejectionClass::Unauthenticated => StatusCode::UNAUTHORIZED,
                RejectionClass::Forbidden => StatusCode::FORBIDDEN,
                RejectionClass::BadRequest => StatusCode::BAD_REQUEST,
            },
            Self::Store(StoreError::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Store(_) | Self::Codec(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
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
        }

        let mut response = (
            status,
            Json(Envelope::<()> {
                success: false,
                data: None,
                // Never the Display text: it may carry internal detail
                error: Some(self.code()),
            }),
        )
            .into_response();

        if let Self::RateLimited { retry_after_secs } = self
            && let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }

        response
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from an account ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(account_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(account_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
