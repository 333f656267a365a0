//! Client the public service uses to reach the storage service

use anyhow::Result;
use axum::http::StatusCode;
use reqwest::Client;
use serde::Serialize;

use crate::config::StorageApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::ArticleRegistration;

/// What the public service reports back for a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Created,
    AlreadyTracked,
    /// Best-effort mode: forwarded, outcome unknown
    Accepted,
}

impl RegistrationStatus {
    pub fn http_status(&self) -> StatusCode {
        match self {
            RegistrationStatus::Created => StatusCode::CREATED,
            RegistrationStatus::AlreadyTracked => StatusCode::ACCEPTED,
            RegistrationStatus::Accepted => StatusCode::OK,
        }
    }
}

pub struct StorageClient {
    client: Client,
    add_article_url: String,
}

impl StorageClient {
    pub fn new(config: &StorageApiConfig, user_agent: &str) -> Result<Self> {
        let client = Client::builder().user_agent(user_agent.to_string()).build()?;
        Ok(Self {
            client,
            add_article_url: format!("{}/add_article", config.base_url.trim_end_matches('/')),
        })
    }

    /// Forward an already-normalized registration
    pub async fn register(&self, registration: &ArticleRegistration) -> ApiResult<RegistrationStatus> {
        let response = self
            .client
            .post(&self.add_article_url)
            .json(registration)
            .send()
            .await
            .map_err(|e| ApiError::Registration(e.to_string()))?;

        match response.status() {
            StatusCode::CREATED => Ok(RegistrationStatus::Created),
            StatusCode::ACCEPTED => Ok(RegistrationStatus::AlreadyTracked),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ApiError::Registration(format!("storage service returned {}: {}", status, body)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_http_codes() {
        assert_eq!(RegistrationStatus::Created.http_status(), StatusCode::CREATED);
        assert_eq!(RegistrationStatus::AlreadyTracked.http_status(), StatusCode::ACCEPTED);
        assert_eq!(RegistrationStatus::Accepted.http_status(), StatusCode::OK);
        assert_eq!(serde_json::to_string(&RegistrationStatus::AlreadyTracked).unwrap(), "\"already_tracked\"");
    }

    #[tokio::test]
    async fn unreachable_storage_is_a_registration_error() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = StorageClient::new(
            &StorageApiConfig {
                base_url: format!("http://{}/", addr),
                propagate_errors: true,
            },
            "pageview-tracker-tests",
        )
        .unwrap();
        let err = client
            .register(&ArticleRegistration {
                article: "Apple_Inc".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Registration(_)));
    }
}
