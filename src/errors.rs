use crate::models::fragment::FragmentError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::error;

/// An HTTP-facing error rendered as `{status: "error", error: {code, message}}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn unsupported_media_type(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "status": "error",
            "error": {
                "code": self.status.as_u16(),
                "message": self.message,
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<FragmentError> for AppError {
    fn from(err: FragmentError) -> Self {
        let status = match &err {
            FragmentError::Invalid(_) | FragmentError::ImmutableType { .. } => {
                StatusCode::BAD_REQUEST
            }
            FragmentError::UnsupportedType(_) | FragmentError::UnsupportedConversion { .. } => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            FragmentError::NotFound { .. } | FragmentError::MissingData { .. } => {
                StatusCode::NOT_FOUND
            }
            FragmentError::Conversion(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FragmentError::Corrupt { .. } | FragmentError::Storage(_) => {
                error!(error = %err, "fragment operation failed");
                return AppError::internal("internal storage error");
            }
        };
        AppError::new(status, err.to_string())
    }
}
