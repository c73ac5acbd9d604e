//! # Database Connection Pool Module
//!
//! Provides SQLite connection pooling and schema setup for the local store.
//!
//! ## Features
//!
//! - **WAL Mode**: Enabled for better concurrency (multiple readers, one writer)
//! - **Connection Pooling**: Configurable min/max connections with timeouts
//! - **Foreign Keys**: Enforced for referential integrity
//! - **Schema Setup**: Idempotent `CREATE TABLE IF NOT EXISTS` on initialization
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_store::db::{create_pool, DatabaseConfig};
//!
//! let config = DatabaseConfig::new("sqlite:linkbook.db");
//! let pool = create_pool(config).await?;
//! ```
//!
//! For tests, use in-memory databases:
//!
//! ```rust,ignore
//! let pool = create_test_pool().await?;
//! ```

use crate::{Result, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Database configuration for the SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL, e.g. `sqlite:linkbook.db` or `sqlite::memory:`
    pub database_url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            min_connections: 1,
            max_connections: 4,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Create a connection pool and set up the schema.
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| StoreError::Database(e.to_string()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

    init_schema(&pool).await?;

    info!("Database pool ready: {}", config.database_url);
    Ok(pool)
}

/// Create an in-memory pool with the full schema, for tests.
pub async fn create_test_pool() -> Result<SqlitePool> {
    // A single connection keeps the in-memory database alive and shared.
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| StoreError::Database(e.to_string()))?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Create the collection tables if they do not exist yet.
async fn init_schema(pool: &SqlitePool) -> Result<()> {
    debug!("Initializing local store schema");

    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS links (
            row_id INTEGER PRIMARY KEY,
            id TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            url TEXT NOT NULL,
            title TEXT,
            disabled INTEGER NOT NULL DEFAULT 0,
            etag TEXT,
            duplicated INTEGER NOT NULL DEFAULT 0,
            conflicted INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0,
            synced INTEGER NOT NULL DEFAULT 0,
            UNIQUE (url, duplicated)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS link_tags (
            link_id TEXT NOT NULL REFERENCES links (id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            added_at INTEGER NOT NULL,
            PRIMARY KEY (link_id, name)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS favorites (
            row_id INTEGER PRIMARY KEY,
            id TEXT NOT NULL UNIQUE,
            added_at INTEGER NOT NULL,
            name TEXT NOT NULL,
            etag TEXT,
            duplicated INTEGER NOT NULL DEFAULT 0,
            conflicted INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0,
            synced INTEGER NOT NULL DEFAULT 0,
            UNIQUE (name, duplicated)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS favorite_tags (
            favorite_id TEXT NOT NULL REFERENCES favorites (id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            added_at INTEGER NOT NULL,
            PRIMARY KEY (favorite_id, name)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            row_id INTEGER PRIMARY KEY,
            id TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            excerpt TEXT NOT NULL,
            link_id TEXT,
            etag TEXT,
            duplicated INTEGER NOT NULL DEFAULT 0,
            conflicted INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0,
            synced INTEGER NOT NULL DEFAULT 0,
            UNIQUE (excerpt, duplicated)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS note_tags (
            note_id TEXT NOT NULL REFERENCES notes (id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            added_at INTEGER NOT NULL,
            PRIMARY KEY (note_id, name)
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
    }

    Ok(())
}
