//! Agent error taxonomy and its mapping onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    /// Platform metric source unavailable or a read failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// Query attempted before the provider finished initializing.
    #[error("metrics provider not initialized")]
    NotInitialized,
}

/// Body shape for failed point queries: `{"error": "..."}`.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = match &self {
            AgentError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
        };

        tracing::error!(status = %status, error = %self, "point query failed");

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
