//! Storage API handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use super::StorageState;
use crate::db::Registration;
use crate::error::ApiResult;
use crate::models::ArticleRegistration;

pub const ALREADY_TRACKED_DETAIL: &str = "Article is already tracked in the database.";

/// 201 with the new row, or 202 when the name is already tracked
pub async fn add_article(
    State(state): State<Arc<StorageState>>,
    Json(request): Json<ArticleRegistration>,
) -> ApiResult<Response> {
    // Idempotent, so names the public service already normalized pass through unchanged
    let registration = request.normalized()?;

    let response = match state.store.register_article(&registration.article).await? {
        Registration::Created(article) => {
            tracing::info!("Now tracking article {} (id {})", article.name, article.id);
            (StatusCode::CREATED, Json(json!({ "id": article.id, "article": article.name }))).into_response()
        }
        Registration::AlreadyTracked => {
            tracing::debug!("Article {} already tracked", registration.article);
            (
                StatusCode::ACCEPTED,
                Json(json!({ "article": registration.article, "detail": ALREADY_TRACKED_DETAIL })),
            )
                .into_response()
        }
    };

    Ok(response)
}

pub async fn health(State(state): State<Arc<StorageState>>) -> Response {
    match state.store.health_check().await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unavailable" }))).into_response()
        }
    }
}
