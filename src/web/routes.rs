//! Public API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::AppState;
use crate::error::ApiResult;
use crate::models::{ArticleRegistration, PageviewPath, PageviewQuery};
use crate::storage_client::RegistrationStatus;

pub const WELCOME_MESSAGE: &str = "Welcome to the Wikipedia Pageview Tracking API";

/// Liveness check
pub async fn index() -> Json<Value> {
    Json(json!({ "message": WELCOME_MESSAGE }))
}

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub article: String,
    pub status: RegistrationStatus,
}

/// Normalize the title and hand it to the storage service
pub async fn add_article(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ArticleRegistration>,
) -> ApiResult<(StatusCode, Json<RegistrationResponse>)> {
    let registration = request.normalized()?;

    let status = match state.storage.register(&registration).await {
        Ok(status) => status,
        Err(e) if !state.propagate_registration_errors => {
            tracing::warn!("Registration of {} not confirmed: {}", registration.article, e);
            RegistrationStatus::Accepted
        }
        Err(e) => return Err(e),
    };

    Ok((
        status.http_status(),
        Json(RegistrationResponse {
            article: registration.article,
            status,
        }),
    ))
}

/// Relay the upstream per-article series wrapped as `{"response": ...}`
pub async fn page_views(State(state): State<Arc<AppState>>, Path(path): Path<PageviewPath>) -> ApiResult<Json<Value>> {
    let query = PageviewQuery::try_from(path)?;
    let response = state.wikimedia.fetch_pageviews(&query).await?;
    Ok(Json(json!({ "response": response })))
}
