// SQLite Connection Pool Setup

use crate::error::map_sqlx_error;
use fatura_core::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Create a pool with WAL journaling, a busy timeout and foreign keys on
///
/// Accepts a `sqlite:` URL or a plain file path.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite://{}", database_url)
    };

    let options = SqliteConnectOptions::from_str(&url)
        .map_err(map_sqlx_error)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true)
        .create_if_missing(true);

    // An in-memory database lives per connection; keep exactly one
    let max_connections = if url.contains(":memory:") { 1 } else { 10 };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)
}
