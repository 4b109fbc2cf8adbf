use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// API Error with rich context and automatic error trait implementations
///
/// Design: Uses thiserror for ergonomic error handling with context.
/// Each variant carries meaningful context to help with debugging.
#[derive(Error, Debug)]
pub enum ApiError {
    // Upstream source errors 2xxx
    #[error("Source fetch failed for dimension {dimension}: {message}")]
    SourceFetchFailed { dimension: String, message: String },

    // Resource errors 3xxx
    #[error("Unknown dimension: {0}")]
    DimensionNotFound(String),

    #[error("Query {query_id} not found")]
    QueryNotFound { query_id: String },

    // Validation errors 4xxx
    #[error("Invalid filter field: {0}")]
    InvalidFilter(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // System errors 5xxx
    #[error("Internal error: {0}")]
    InternalError(String),

    // Generic wrapper for other errors - auto-convert from anyhow::Error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// Helper to create source fetch error
    pub fn source_fetch_failed(dimension: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceFetchFailed { dimension: dimension.into(), message: message.into() }
    }

    /// Helper to create unknown dimension error
    pub fn dimension_not_found(name: impl Into<String>) -> Self {
        Self::DimensionNotFound(name.into())
    }

    /// Helper to create query not found error
    pub fn query_not_found(query_id: impl Into<String>) -> Self {
        Self::QueryNotFound { query_id: query_id.into() }
    }

    /// Helper to create invalid filter error
    pub fn invalid_filter(field: impl Into<String>) -> Self {
        Self::InvalidFilter(field.into())
    }

    /// Helper to create invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Helper to create internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// Numeric error code carried in every error payload
    pub fn error_code(&self) -> i32 {
        match self {
            // Upstream source errors 2xxx
            Self::SourceFetchFailed { .. } => 2001,

            // Resource errors 3xxx
            Self::DimensionNotFound(_) => 3001,
            Self::QueryNotFound { .. } => 3002,

            // Validation errors 4xxx
            Self::InvalidFilter(_) => 4001,
            Self::InvalidInput(_) => 4002,

            // System errors 5xxx
            Self::InternalError(_) => 5001,
            Self::Other(_) => 5001,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let message = self.to_string();

        let status = match code {
            2001..=2999 => StatusCode::BAD_GATEWAY,
            3000..=3999 => StatusCode::NOT_FOUND,
            4001..=4999 => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let response = ApiErrorResponse { code, message, details: None };

        (status, Json(response)).into_response()
    }
}

/// Implement From for serde_json::Error
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::internal_error(format!("JSON serialization error: {}", err))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::internal_error(format!("HTTP client error: {}", err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
