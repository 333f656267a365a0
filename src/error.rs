//! HTTP-facing error type shared by both services

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;
use crate::models::ValidationError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The pageview source answered with a non-success status
    #[error("pageview source returned {status}")]
    Upstream {
        status: StatusCode,
        body: serde_json::Value,
    },

    #[error("pageview source unreachable: {0}")]
    UpstreamUnreachable(reqwest::Error),

    #[error("pageview source returned malformed JSON: {0}")]
    UpstreamMalformed(String),

    #[error("storage service failed to register article: {0}")]
    Registration(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream { status, .. } => *status,
            ApiError::UpstreamUnreachable(_) | ApiError::UpstreamMalformed(_) | ApiError::Registration(_) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Upstream { body, .. } => json!({ "error": self.to_string(), "upstream": body }),
            // Store details stay in the log
            ApiError::Store(e) => {
                tracing::error!("Store failure: {}", e);
                json!({ "error": "internal storage error" })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
