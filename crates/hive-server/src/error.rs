//! HTTP error taxonomy.
//!
//! Every error renders as a JSON [`ErrorBody`] with a stable
//! machine-readable `code`, so clients can branch without parsing
//! human-oriented messages.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use hive_core::wire::{self, ErrorBody};

/// Failures surfaced by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The path named an agent outside the fixed pool.
    #[error("unknown agent id: {0}")]
    AgentNotFound(String),

    /// The pool has shut down and accepts no more messages.
    #[error("agent pool is unavailable")]
    PoolUnavailable,

    /// The request body failed validation.
    #[error("{0}")]
    InvalidParams(String),
}

impl ApiError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AgentNotFound(_) => wire::AGENT_NOT_FOUND,
            Self::PoolUnavailable => wire::POOL_UNAVAILABLE,
            Self::InvalidParams(_) => wire::INVALID_PARAMS,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::AgentNotFound(_) => StatusCode::NOT_FOUND,
            Self::PoolUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidParams(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
