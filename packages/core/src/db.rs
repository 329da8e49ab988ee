//! SQLite pool creation.
//!
//! Migrations under `migrations/` are embedded at compile time and applied
//! on every pool creation (they are idempotent).

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Open (creating if needed) the database at `database_url` and apply migrations.
///
/// In-memory URLs get a single connection: every SQLite in-memory
/// connection is a separate database.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|err| sqlx::Error::Migrate(Box::new(err)))?;

    tracing::debug!("SQLite pool ready at {}", database_url);
    Ok(pool)
}
