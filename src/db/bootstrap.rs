//! One-time store setup: role, database, tables, lookup rows
//!
//! Every step checks before it creates, so running `bootstrap` again is harmless.
//! Role and database DDL cannot take bind parameters, hence the quoting helpers.

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tracing::info;

use super::{schema, Database};
use crate::config::DatabaseConfig;

/// Maintenance database the admin connects to
const ADMIN_DATABASE: &str = "postgres";

pub async fn run(config: &DatabaseConfig) -> Result<()> {
    let mut admin = connect_admin(config).await?;
    create_role(&mut admin, config).await?;
    create_database(&mut admin, config).await?;
    admin.close().await?;

    let db = Database::new(config)
        .await
        .with_context(|| format!("connecting to database {} as {}", config.name, config.user))?;
    db.run_migrations().await.context("creating tables")?;
    db.seed_lookups().await.context("seeding lookup tables")?;

    for (table, _) in schema::lookup_seeds() {
        let names = db.lookup_names(table).await?;
        info!("{}: {} rows ({})", table, names.len(), names.join(", "));
    }

    info!("Bootstrap of database {} complete", config.name);
    Ok(())
}

async fn connect_admin(config: &DatabaseConfig) -> Result<PgConnection> {
    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.admin_user)
        .database(ADMIN_DATABASE);
    if let Some(password) = &config.admin_password {
        options = options.password(password);
    }

    PgConnection::connect_with(&options)
        .await
        .with_context(|| format!("connecting to {}:{} as {}", config.host, config.port, config.admin_user))
}

async fn create_role(conn: &mut PgConnection, config: &DatabaseConfig) -> Result<()> {
    let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_catalog.pg_roles WHERE rolname = $1")
        .bind(&config.user)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_some() {
        info!("Role {} already exists", config.user);
        return Ok(());
    }

    info!("Creating role {}", config.user);
    let role = quote_ident(&config.user);
    sqlx::raw_sql(&format!(
        "CREATE ROLE {role} LOGIN CREATEDB PASSWORD {}",
        quote_literal(&config.password)
    ))
    .execute(&mut *conn)
    .await
    .with_context(|| format!("creating role {}", config.user))?;

    // Lets a non-superuser admin hand the new database to this role
    if config.admin_user != config.user {
        sqlx::raw_sql(&format!("GRANT {role} TO {}", quote_ident(&config.admin_user)))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn create_database(conn: &mut PgConnection, config: &DatabaseConfig) -> Result<()> {
    let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1")
        .bind(&config.name)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_some() {
        info!("Database {} already exists", config.name);
        return Ok(());
    }

    info!("Creating database {} owned by {}", config.name, config.user);
    // CREATE DATABASE refuses to run inside a transaction; raw_sql uses the simple protocol
    sqlx::raw_sql(&format!(
        "CREATE DATABASE {} WITH OWNER = {}",
        quote_ident(&config.name),
        quote_ident(&config.user)
    ))
    .execute(&mut *conn)
    .await
    .with_context(|| format!("creating database {}", config.name))?;
    Ok(())
}

/// Double-quoted SQL identifier
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quoted SQL string literal (standard_conforming_strings)
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("pageviews"), "\"pageviews\"");
        assert_eq!(quote_ident("a\"; DROP ROLE x; --"), "\"a\"\"; DROP ROLE x; --\"");
    }

    #[test]
    fn literals_are_quoted() {
        assert_eq!(quote_literal("s3cret"), "'s3cret'");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }
}
