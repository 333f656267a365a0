//! Configuration management

use anyhow::Result;
use config::builder::DefaultState;
use config::ConfigBuilder;
use serde::Deserialize;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const ENV_PREFIX: &str = "PAGEVIEWS";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_public_server")]
    pub public_server: ServerConfig,
    #[serde(default = "default_storage_server")]
    pub storage_server: ServerConfig,
    #[serde(default)]
    pub wikimedia: Option<WikimediaConfig>,
    #[serde(default)]
    pub storage_api: Option<StorageApiConfig>,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which service the binary is about to run; decides the required sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Public,
    Storage,
    Bootstrap,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_public_server() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 8888,
    }
}

fn default_storage_server() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 8889,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WikimediaConfig {
    /// REST root, e.g. "https://wikimedia.org/api/rest_v1"
    #[serde(default = "default_wikimedia_base_url")]
    pub base_url: String,
    /// Sent on every outbound request. Wikimedia rejects anonymous clients.
    pub user_agent: String,
    /// Request timeout; the HTTP client default applies when unset
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_wikimedia_base_url() -> String {
    "https://wikimedia.org/api/rest_v1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageApiConfig {
    pub base_url: String,
    /// When false, registration failures are logged and the caller still gets an ack
    #[serde(default = "default_propagate_errors")]
    pub propagate_errors: bool,
}

fn default_propagate_errors() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    /// Superuser used by `bootstrap` to create the role and database
    #[serde(default = "default_admin_user")]
    pub admin_user: String,
    #[serde(default)]
    pub admin_password: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_host() -> String {
    "127.0.0.1".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_admin_user() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load `config.toml` (or `path`) layered under `PAGEVIEWS_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path),
            None => config::File::with_name(DEFAULT_CONFIG_PATH).required(false),
        };

        let builder = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::from_builder(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for (name, server) in [("public_server", &self.public_server), ("storage_server", &self.storage_server)] {
            if server.port == 0 {
                anyhow::bail!("Invalid {}.port: 0 is not allowed", name);
            }
            if server.host.is_empty() {
                anyhow::bail!("{}.host cannot be empty", name);
            }
        }

        if let Some(wikimedia) = &self.wikimedia {
            if wikimedia.base_url.trim().is_empty() {
                anyhow::bail!("wikimedia.base_url cannot be empty");
            }
            if wikimedia.user_agent.trim().is_empty() {
                anyhow::bail!("wikimedia.user_agent is required by the Wikimedia API and cannot be empty");
            }
            if wikimedia.timeout_secs == Some(0) {
                anyhow::bail!("wikimedia.timeout_secs must be positive when set");
            }
        }

        if let Some(storage_api) = &self.storage_api {
            if storage_api.base_url.trim().is_empty() {
                anyhow::bail!("storage_api.base_url cannot be empty");
            }
        }

        if let Some(database) = &self.database {
            if database.name.is_empty() {
                anyhow::bail!("database.name cannot be empty");
            }
            if database.user.is_empty() {
                anyhow::bail!("database.user cannot be empty");
            }
            if database.max_connections == 0 {
                anyhow::bail!("database.max_connections must be at least 1");
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid logging level '{}'. Must be one of: {:?}", self.logging.level, valid_levels);
        }

        Ok(())
    }

    /// Fail unless every section `role` reads is present.
    pub fn require(&self, role: Role) -> Result<()> {
        match role {
            Role::Public => {
                self.wikimedia()?;
                self.storage_api()?;
            }
            Role::Storage | Role::Bootstrap => {
                self.database()?;
            }
        }
        Ok(())
    }

    pub fn wikimedia(&self) -> Result<&WikimediaConfig> {
        self.wikimedia
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[wikimedia] section with user_agent is required by the public API"))
    }

    pub fn storage_api(&self) -> Result<&StorageApiConfig> {
        self.storage_api
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[storage_api] section with base_url is required by the public API"))
    }

    pub fn database(&self) -> Result<&DatabaseConfig> {
        self.database
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[database] section is required by the storage API and bootstrap"))
    }
}
