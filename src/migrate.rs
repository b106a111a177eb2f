use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Create the database at `[db].path` if needed and bring its schema up to
/// date.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    store.close().await;
    Ok(())
}

/// Create all tables and indexes on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            content_hash TEXT NOT NULL UNIQUE,
            payload BLOB NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS archives (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            content_hash TEXT NOT NULL UNIQUE,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notification_targets (
            id TEXT PRIMARY KEY,
            enabled INTEGER NOT NULL DEFAULT 1,
            last_acknowledged_year INTEGER,
            last_acknowledged_month INTEGER,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_archives_period ON archives(year, month)")
        .execute(pool)
        .await?;

    Ok(())
}
