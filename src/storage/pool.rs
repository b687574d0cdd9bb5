//! Database connection pool management.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use crate::config::DatabaseConfig;
use crate::errors::Result;

/// Shared connection pool type
pub type DbPool = Pool<Sqlite>;

/// Create a connection pool honoring the configured dial deadline.
///
/// Read/write deadlines are applied per operation by the repositories.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.dial_timeout())
        .connect(&config.url)
        .await?;

    Ok(pool)
}
