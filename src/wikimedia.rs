//! Client for the Wikimedia REST pageviews endpoint

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, Level};

use crate::config::WikimediaConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::{PageviewQuery, PageviewsResponse};

/// One GET per query: no retries, no caching.
///
/// The upstream documents a 100 requests/second limit; it is not enforced here.
pub struct WikimediaClient {
    client: Client,
    base_url: Url,
}

impl WikimediaClient {
    pub fn new(config: &WikimediaConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("invalid wikimedia.base_url '{}'", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("wikimedia.base_url '{}' cannot be used as a base URL", config.base_url);
        }

        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    /// Upstream URL for `query`, with every path segment percent-encoded
    pub fn url_for(&self, query: &PageviewQuery) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(query.upstream_segments());
        }
        url
    }

    /// Fetch the per-article series and return the upstream JSON as-is
    pub async fn fetch_pageviews(&self, query: &PageviewQuery) -> ApiResult<Value> {
        let url = self.url_for(query);
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(ApiError::UpstreamUnreachable)?;

        let status = response.status();
        let text = response.text().await.map_err(ApiError::UpstreamUnreachable)?;

        if !status.is_success() {
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            return Err(ApiError::Upstream { status, body });
        }

        let body: Value = serde_json::from_str(&text).map_err(|e| ApiError::UpstreamMalformed(e.to_string()))?;

        if tracing::enabled!(Level::DEBUG) {
            log_summary(query, &body);
        }

        Ok(body)
    }
}

fn log_summary(query: &PageviewQuery, body: &Value) {
    if let Ok(parsed) = PageviewsResponse::deserialize(body) {
        let (first, last) = parsed.span().unwrap_or(("-", "-"));
        debug!(
            "{} {}: {} items {}..{}, {} views",
            query.project,
            query.article,
            parsed.items.len(),
            first,
            last,
            parsed.total_views()
        );
    }
}
