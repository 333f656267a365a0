//! Wikipedia pageview tracker
//!
//! One binary, three roles:
//! - `public`: user-facing API that proxies pageview lookups to Wikimedia
//!   and forwards article registrations to the storage service
//! - `storage`: internal API that records tracked articles in PostgreSQL
//! - `bootstrap`: one-time creation of the role, database, tables and lookup rows

mod config;
mod db;
mod error;
mod models;
mod storage_api;
mod storage_client;
mod web;
mod wikimedia;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "wiki-pageviews", version, about = "Wikipedia pageview tracking services")]
struct Cli {
    /// Configuration file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the public API
    Public,
    /// Serve the internal storage API
    Storage,
    /// Create role, database, tables and lookup rows, then exit
    Bootstrap,
}

impl Command {
    fn role(&self) -> config::Role {
        match self {
            Command::Public => config::Role::Public,
            Command::Storage => config::Role::Storage,
            Command::Bootstrap => config::Role::Bootstrap,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Missing or invalid configuration is fatal before anything is served
    let config = config::Config::load(cli.config.as_deref())?;

    config.require(cli.command.role())?;

    init_logging(&config.logging.level);
    info!("Configuration loaded");

    match cli.command {
        Command::Public => web::start_server(&config).await?,
        Command::Storage => storage_api::start_server(&config).await?,
        Command::Bootstrap => db::bootstrap::run(config.database()?).await?,
    }

    Ok(())
}

/// LOG_FORMAT=gcp selects structured GCP Cloud Logging; RUST_LOG overrides the configured level
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_lowercase()));

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
