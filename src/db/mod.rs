//! Database module

pub mod bootstrap;
#[cfg(test)]
pub mod memory;
pub mod schema;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use schema::{ARTICLES_TABLE, NAME_COLUMN};

const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some(PG_UNIQUE_VIOLATION) => return StoreError::UniqueViolation(db_err.message().to_string()),
                Some(PG_FOREIGN_KEY_VIOLATION) => {
                    return StoreError::ForeignKeyViolation(db_err.message().to_string())
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A tracked article row
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Article {
    pub id: i32,
    pub name: String,
}

/// Result of registering an already-normalized article name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Created(Article),
    AlreadyTracked,
}

/// Persistence seam behind the storage service
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Record `name` unless it is already tracked. Never creates a duplicate row.
    async fn register_article(&self, name: &str) -> StoreResult<Registration>;

    async fn health_check(&self) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> StoreResult<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);

        info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            user = %config.user,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create the five tables if absent
    pub async fn run_migrations(&self) -> StoreResult<()> {
        for statement in schema::create_statements() {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert the fixed lookup values; rows already present are left untouched
    pub async fn seed_lookups(&self) -> StoreResult<()> {
        for (table, values) in schema::lookup_seeds() {
            let values: Vec<String> = values.into_iter().map(String::from).collect();
            let result = sqlx::query(&schema::seed_statement(table))
                .bind(&values)
                .execute(&self.pool)
                .await?;
            debug!("Seeded {}: {} new of {} values", table, result.rows_affected(), values.len());
        }
        Ok(())
    }

    /// Names stored in a lookup table, in id order
    pub async fn lookup_names(&self, table: &str) -> StoreResult<Vec<String>> {
        let sql = format!("SELECT {NAME_COLUMN} FROM {table} ORDER BY id");
        let names = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(names)
    }

    pub async fn find_article(&self, name: &str) -> StoreResult<Option<Article>> {
        let sql = format!("SELECT id, {NAME_COLUMN} FROM {ARTICLES_TABLE} WHERE {NAME_COLUMN} = $1");
        let article = sqlx::query_as::<_, Article>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    /// Insert a new article; `None` when the name is already present
    pub async fn insert_article(&self, name: &str) -> StoreResult<Option<Article>> {
        let sql = format!(
            "INSERT INTO {ARTICLES_TABLE} ({NAME_COLUMN}) VALUES ($1)
             ON CONFLICT ({NAME_COLUMN}) DO NOTHING
             RETURNING id, {NAME_COLUMN}"
        );
        let article = sqlx::query_as::<_, Article>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }
}

#[async_trait]
impl ArticleStore for Database {
    async fn register_article(&self, name: &str) -> StoreResult<Registration> {
        if self.find_article(name).await?.is_some() {
            return Ok(Registration::AlreadyTracked);
        }

        // A concurrent registration can land between the lookup and the insert;
        // the unique constraint turns that into an empty RETURNING.
        Ok(match self.insert_article(name).await? {
            Some(article) => Registration::Created(article),
            None => Registration::AlreadyTracked,
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
