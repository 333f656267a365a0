//! Public API server

pub mod middleware;
mod routes;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

use crate::config::Config;
use crate::storage_client::StorageClient;
use crate::wikimedia::WikimediaClient;
use middleware::RequestLoggingLayer;

pub struct AppState {
    pub wikimedia: WikimediaClient,
    pub storage: StorageClient,
    /// Surface storage failures to the caller instead of acknowledging anyway
    pub propagate_registration_errors: bool,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let wikimedia = config.wikimedia()?;
        let storage_api = config.storage_api()?;
        Ok(Self {
            wikimedia: WikimediaClient::new(wikimedia)?,
            storage: StorageClient::new(storage_api, &wikimedia.user_agent)?,
            propagate_registration_errors: storage_api.propagate_errors,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/add_article", post(routes::add_article))
        .route(
            "/page_views/:project/:access/:agent/:article/:granularity/:start/:end",
            get(routes::page_views),
        )
        .layer(RequestLoggingLayer::new("public"))
        .with_state(state)
}

pub async fn start_server(config: &Config) -> Result<()> {
    let state = Arc::new(AppState::from_config(config)?);
    if !state.propagate_registration_errors {
        info!("Storage failures on /add_article will be logged and acknowledged");
    }

    let app = router(state);

    let addr = config.public_server.bind_addr();
    info!("Public API starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StorageApiConfig, WikimediaConfig};
    use crate::db::memory::MemoryStore;
    use axum::{
        body::{to_bytes, Body},
        extract::State,
        http::{header::USER_AGENT, Request, StatusCode},
        response::{IntoResponse, Response},
        Json,
    };
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tower::ServiceExt;

    const USER_AGENT_STRING: &str = "pageview-tracker-tests/0.1 (ops@example.org)";

    /// (raw path, user agent) of every request the fake upstream saw
    type Seen = Arc<Mutex<Vec<(String, Option<String>)>>>;

    fn upstream_fixture() -> Value {
        let item = |timestamp: &str, views: u64| {
            json!({
                "access": "all-access",
                "agent": "all-agents",
                "article": "Apple_Inc",
                "granularity": "daily",
                "project": "en.wikipedia",
                "timestamp": timestamp,
                "views": views
            })
        };
        json!({ "items": [item("2019062600", 243), item("2019062700", 201), item("2019062800", 259)] })
    }

    async fn fake_upstream(State(seen): State<Seen>, request: Request<Body>) -> Response {
        let path = request.uri().path().to_string();
        let agent = request
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        seen.lock().unwrap().push((path.clone(), agent));

        if path.contains("/Missing_Page/") {
            let body = json!({ "type": "https://mediawiki.org/wiki/HyperSwitch/errors/not_found", "title": "Not found." });
            return (StatusCode::NOT_FOUND, Json(body)).into_response();
        }
        if path.contains("/Garbled/") {
            return (StatusCode::OK, "<html>oops</html>").into_response();
        }
        Json(upstream_fixture()).into_response()
    }

    async fn spawn(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn spawn_upstream() -> (SocketAddr, Seen) {
        let seen: Seen = Arc::default();
        let app = Router::new().fallback(fake_upstream).with_state(seen.clone());
        (spawn(app).await, seen)
    }

    fn public_app(upstream: SocketAddr, storage_base_url: String, propagate_errors: bool) -> Router {
        let wikimedia = WikimediaClient::new(&WikimediaConfig {
            base_url: format!("http://{}/api/rest_v1", upstream),
            user_agent: USER_AGENT_STRING.to_string(),
            timeout_secs: Some(5),
        })
        .unwrap();
        let storage = StorageClient::new(
            &StorageApiConfig {
                base_url: storage_base_url,
                propagate_errors,
            },
            USER_AGENT_STRING,
        )
        .unwrap();
        router(Arc::new(AppState {
            wikimedia,
            storage,
            propagate_registration_errors: propagate_errors,
        }))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_article(article: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/add_article")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "article": article }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn index_returns_welcome_without_side_effects() {
        let (upstream, seen) = spawn_upstream().await;
        let app = public_app(upstream, "http://127.0.0.1:9".to_string(), true);

        let (status, body) = send(&app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "Welcome to the Wikipedia Pageview Tracking API" }));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn page_views_wraps_upstream_json_unchanged() {
        let (upstream, seen) = spawn_upstream().await;
        let app = public_app(upstream, "http://127.0.0.1:9".to_string(), true);

        let (status, body) = send(
            &app,
            get("/page_views/en.wikipedia.org/all-access/all-agents/Apple%20Inc/daily/20190626/20190701"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "response": upstream_fixture() }));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].0,
            "/api/rest_v1/metrics/pageviews/per-article/en.wikipedia.org/all-access/all-agents/Apple_Inc/daily/20190626/20190701"
        );
        assert_eq!(seen[0].1.as_deref(), Some(USER_AGENT_STRING));
    }

    #[tokio::test]
    async fn encoded_titles_reach_upstream_encoded() {
        let (upstream, seen) = spawn_upstream().await;
        let app = public_app(upstream, "http://127.0.0.1:9".to_string(), true);

        let (status, _) = send(
            &app,
            get("/page_views/en.wikipedia.org/desktop/user/Are_You_the_One%3F/monthly/2019010100/2019063000"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(seen.lock().unwrap()[0].0.contains("/Are_You_the_One%3F/monthly/"));
    }

    #[tokio::test]
    async fn invalid_segments_never_reach_upstream() {
        let (upstream, seen) = spawn_upstream().await;
        let app = public_app(upstream, "http://127.0.0.1:9".to_string(), true);

        for uri in [
            "/page_views/en.wikipedia.org/tablet/all-agents/Apple_Inc/daily/20190626/20190701",
            "/page_views/en.wikipedia.org/all-access/robots/Apple_Inc/daily/20190626/20190701",
            "/page_views/en.wikipedia.org/all-access/all-agents/Apple_Inc/weekly/20190626/20190701",
            "/page_views/en.wikipedia.org/all-access/all-agents/Apple_Inc/daily/2019-06-26/20190701",
            "/page_views/en.wikipedia.org/all-access/all-agents/Apple_Inc/daily/20190701/20190626",
            "/page_views/en.wikipedia.org/all-access/all-agents/%2E/daily/20190626/20190701",
            "/page_views/en.wikipedia.org/all-access/all-agents/%2E%2E/daily/20190626/20190701",
            "/page_views/%2E%2E/all-access/all-agents/Apple_Inc/daily/20190626/20190701",
        ] {
            let (status, body) = send(&app, get(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["error"].is_string(), "{uri}");
        }
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_errors_are_relayed() {
        let (upstream, _) = spawn_upstream().await;
        let app = public_app(upstream, "http://127.0.0.1:9".to_string(), true);

        let (status, body) = send(
            &app,
            get("/page_views/en.wikipedia.org/all-access/all-agents/Missing_Page/daily/20190626/20190701"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["upstream"]["title"], "Not found.");

        let (status, _) = send(
            &app,
            get("/page_views/en.wikipedia.org/all-access/all-agents/Garbled/daily/20190626/20190701"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn registration_is_normalized_and_idempotent_end_to_end() {
        let store = Arc::new(MemoryStore::default());
        let storage = spawn(crate::storage_api::router(store.clone())).await;
        let (upstream, _) = spawn_upstream().await;
        let app = public_app(upstream, format!("http://{}", storage), true);

        let (status, body) = send(&app, post_article("Apple Inc")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({ "article": "Apple_Inc", "status": "created" }));
        assert_eq!(store.names(), ["Apple_Inc"]);

        let (status, body) = send(&app, post_article("Apple_Inc")).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "already_tracked");
        assert_eq!(store.names(), ["Apple_Inc"]);
    }

    #[tokio::test]
    async fn blank_article_is_rejected_before_forwarding() {
        let store = Arc::new(MemoryStore::default());
        let storage = spawn(crate::storage_api::router(store.clone())).await;
        let (upstream, _) = spawn_upstream().await;
        let app = public_app(upstream, format!("http://{}", storage), true);

        let (status, _) = send(&app, post_article("   ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(store.names().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_propagates_by_default() {
        let storage = spawn(crate::storage_api::router(Arc::new(MemoryStore::unavailable()))).await;
        let (upstream, _) = spawn_upstream().await;
        let app = public_app(upstream, format!("http://{}", storage), true);

        let (status, body) = send(&app, post_article("Apple Inc")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn storage_failure_is_acknowledged_in_best_effort_mode() {
        let storage = spawn(crate::storage_api::router(Arc::new(MemoryStore::unavailable()))).await;
        let (upstream, _) = spawn_upstream().await;
        let app = public_app(upstream, format!("http://{}", storage), false);

        let (status, body) = send(&app, post_article("Apple Inc")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "article": "Apple_Inc", "status": "accepted" }));
    }
}
