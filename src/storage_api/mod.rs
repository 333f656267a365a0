//! Internal storage API server
//!
//! Only the public service calls this; it is the sole writer to the store.

mod routes;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

use crate::config::Config;
use crate::db::{ArticleStore, Database};
use crate::web::middleware::RequestLoggingLayer;

pub struct StorageState {
    pub store: Arc<dyn ArticleStore>,
}

pub fn router(store: Arc<dyn ArticleStore>) -> Router {
    Router::new()
        .route("/add_article", post(routes::add_article))
        .route("/health", get(routes::health))
        .layer(RequestLoggingLayer::new("storage"))
        .with_state(Arc::new(StorageState { store }))
}

pub async fn start_server(config: &Config) -> Result<()> {
    let database = config.database()?;
    let db = Database::new(database).await?;
    db.run_migrations().await?;
    db.seed_lookups().await?;
    info!("Database {} ready", database.name);

    let app = router(Arc::new(db));

    let addr = config.storage_server.bind_addr();
    info!("Storage API starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
