//! Error types for link resolution and the HTTP API
//!
//! `ResolveError` covers a single resolution branch and never aborts sibling
//! branches. `AppError` is what the API handlers return; it converts to a
//! JSON response with a consistent structure.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::fetch::ScraperError;
use crate::models::ApiError;

/// Failure of one resolution branch
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Payload could not be decoded (bad base64, missing player data)
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] ScraperError),

    /// Embedded or AJAX JSON could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The hop ceiling was reached
    #[error("Depth {depth} exceeded at {url}")]
    DepthExceeded { url: String, depth: u8 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ResolveError {
    /// Short stable name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::Decode(_) => "decode",
            ResolveError::Fetch(_) => "fetch",
            ResolveError::Json(_) => "json",
            ResolveError::DepthExceeded { .. } => "depth",
            ResolveError::InvalidUrl(_) => "invalid_url",
        }
    }
}

/// Errors returned by the API handlers.
///
/// Resolution itself never fails a request: branch failures are logged and
/// an unreachable page yields an empty result.
#[derive(Debug, Error)]
pub enum AppError {
    /// Validation errors (bad request)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found errors
    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::NotFound(msg) => msg.clone(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error_response = ApiError::new(self.user_message());

        HttpResponse::build(status).json(error_response)
    }
}

/// Result type alias for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
