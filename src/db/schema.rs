//! Database schema definitions

use crate::models::{Access, Agent, Granularity};

pub const ARTICLES_TABLE: &str = "articles";
pub const ACCESS_TABLE: &str = "access_methods";
pub const AGENTS_TABLE: &str = "agents";
pub const GRANULARITY_TABLE: &str = "granularities";
pub const PAGE_VIEWS_TABLE: &str = "page_views";

/// Every lookup table, and `articles`, key on this column
pub const NAME_COLUMN: &str = "name";

/// `(id, name)` table with a unique name
fn create_named_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id SERIAL PRIMARY KEY,
            {NAME_COLUMN} TEXT NOT NULL UNIQUE
        )"
    )
}

// No ON DELETE clause: a referenced lookup or article row cannot be removed
fn create_page_views_table() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {PAGE_VIEWS_TABLE} (
            id SERIAL PRIMARY KEY,
            article_id INTEGER NOT NULL REFERENCES {ARTICLES_TABLE} (id),
            access_id INTEGER NOT NULL REFERENCES {ACCESS_TABLE} (id),
            agent_id INTEGER NOT NULL REFERENCES {AGENTS_TABLE} (id),
            granularity_id INTEGER NOT NULL REFERENCES {GRANULARITY_TABLE} (id),
            pageviews INTEGER NOT NULL,
            date DATE NOT NULL,
            UNIQUE (article_id, access_id, agent_id, granularity_id, date)
        )"
    )
}

/// DDL in dependency order. Postgres prepares one statement at a time.
pub fn create_statements() -> Vec<String> {
    vec![
        create_named_table(ARTICLES_TABLE),
        create_named_table(ACCESS_TABLE),
        create_named_table(AGENTS_TABLE),
        create_named_table(GRANULARITY_TABLE),
        create_page_views_table(),
    ]
}

/// Conflict-tolerant insert of a whole value set, bound as one `text[]`.
pub fn seed_statement(table: &str) -> String {
    format!("INSERT INTO {table} ({NAME_COLUMN}) SELECT UNNEST($1::text[]) ON CONFLICT ({NAME_COLUMN}) DO NOTHING")
}

/// Fixed contents of the three lookup tables.
pub fn lookup_seeds() -> [(&'static str, Vec<&'static str>); 3] {
    [
        (ACCESS_TABLE, Access::ALL.iter().map(|v| v.as_str()).collect()),
        (AGENTS_TABLE, Agent::ALL.iter().map(|v| v.as_str()).collect()),
        (GRANULARITY_TABLE, Granularity::ALL.iter().map(|v| v.as_str()).collect()),
    ]
}
