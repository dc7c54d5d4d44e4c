//! Database access for rabdap-id
//!
//! SQLite through sqlx. One `identities` table holds the cache entries;
//! field history is a JSON column.

pub mod seed;
pub mod store;

pub use store::{CacheStore, SelectionFilter, SqliteCacheStore};

use rabdap_common::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS identities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        bruid TEXT NOT NULL UNIQUE,
        shortid TEXT NOT NULL,
        uuid TEXT,
        name TEXT,
        email TEXT,
        rabid TEXT NOT NULL,
        created TEXT NOT NULL,
        updated TEXT NOT NULL,
        historical TEXT NOT NULL DEFAULT '{}'
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_identities_shortid ON identities(shortid)",
    "CREATE INDEX IF NOT EXISTS idx_identities_uuid ON identities(uuid)",
    "CREATE INDEX IF NOT EXISTS idx_identities_email ON identities(email)",
    "CREATE INDEX IF NOT EXISTS idx_identities_updated ON identities(updated)",
];

/// Initialize database connection pool
///
/// Creates the database file and parent folder when missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the schema applied
///
/// Every connection to `sqlite::memory:` is its own database, so the pool
/// is capped at one connection.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create tables and indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Database tables initialized (identities)");

    Ok(())
}
