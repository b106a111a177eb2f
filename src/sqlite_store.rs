//! SQLite-backed [`Store`] implementation.
//!
//! Insert-if-absent is a single `INSERT ... ON CONFLICT(content_hash) DO
//! NOTHING`, so the unique index decides which of two racing writers wins.
//! The acknowledgment watermark moves with one conditional `UPDATE`, which
//! makes concurrent advances compose as a max.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::migrate;
use crate::models::{Archive, Document, DocumentRef, Inserted, NotificationTarget};
use crate::period::Period;
use crate::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect using `[db].path` and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = connect(&config.db.path).await?;
        migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn document_ref_by_hash(&self, content_hash: &str) -> Result<DocumentRef> {
        let row = sqlx::query(
            "SELECT id, filename, content_hash, created_at FROM documents WHERE content_hash = ?",
        )
        .bind(content_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(DocumentRef {
            id: row.get("id"),
            filename: row.get("filename"),
            content_hash: row.get("content_hash"),
            created_at: from_ts(row.get("created_at"))?,
        })
    }
}

/// WAL pool over the database file at `path`. The file and its parent
/// directory are created if missing.
async fn connect(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))
}

fn from_ts(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| anyhow!("timestamp out of range: {}", ts))
}

fn to_period(year: i64, month: i64) -> Result<Period> {
    let year = i32::try_from(year).map_err(|_| anyhow!("year out of range: {}", year))?;
    let month = u32::try_from(month).map_err(|_| anyhow!("month out of range: {}", month))?;
    Period::new(year, month).map_err(|e| anyhow!("{}", e))
}

fn archive_from_row(row: &SqliteRow) -> Result<Archive> {
    Ok(Archive {
        id: row.get("id"),
        filename: row.get("filename"),
        content_hash: row.get("content_hash"),
        period: to_period(row.get("year"), row.get("month"))?,
        created_at: from_ts(row.get("created_at"))?,
    })
}

fn target_from_row(row: &SqliteRow) -> Result<NotificationTarget> {
    let year: Option<i64> = row.get("last_acknowledged_year");
    let month: Option<i64> = row.get("last_acknowledged_month");
    let last_acknowledged = match (year, month) {
        (Some(y), Some(m)) => Some(to_period(y, m)?),
        _ => None,
    };
    let enabled: i64 = row.get("enabled");
    Ok(NotificationTarget {
        id: row.get("id"),
        enabled: enabled != 0,
        last_acknowledged,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_document(&self, doc: &Document) -> Result<Inserted<DocumentRef>> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (id, filename, content_hash, payload, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(content_hash) DO NOTHING
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.filename)
        .bind(&doc.content_hash)
        .bind(&doc.payload)
        .bind(doc.created_at.timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(Inserted::Created(doc.to_ref()))
        } else {
            Ok(Inserted::Existing(
                self.document_ref_by_hash(&doc.content_hash).await?,
            ))
        }
    }

    async fn documents_in_period(&self, period: Period) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, filename, content_hash, payload, created_at
            FROM documents
            WHERE created_at >= ? AND created_at < ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(period.start().timestamp())
        .bind(period.end().timestamp())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Document {
                    id: row.get("id"),
                    filename: row.get("filename"),
                    content_hash: row.get("content_hash"),
                    payload: row.get("payload"),
                    created_at: from_ts(row.get("created_at"))?,
                })
            })
            .collect()
    }

    async fn period_counts(&self) -> Result<Vec<(Period, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT CAST(strftime('%Y', created_at, 'unixepoch') AS INTEGER) AS year,
                   CAST(strftime('%m', created_at, 'unixepoch') AS INTEGER) AS month,
                   COUNT(*) AS count
            FROM documents
            GROUP BY year, month
            ORDER BY year ASC, month ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let count: i64 = row.get("count");
                Ok((to_period(row.get("year"), row.get("month"))?, count))
            })
            .collect()
    }

    async fn count_documents(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_archive(&self, archive: &Archive) -> Result<Inserted<Archive>> {
        let result = sqlx::query(
            r#"
            INSERT INTO archives (id, filename, content_hash, year, month, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_hash) DO NOTHING
            "#,
        )
        .bind(&archive.id)
        .bind(&archive.filename)
        .bind(&archive.content_hash)
        .bind(archive.period.year as i64)
        .bind(archive.period.month as i64)
        .bind(archive.created_at.timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(Inserted::Created(archive.clone()));
        }
        let existing = self
            .find_archive_by_hash(&archive.content_hash)
            .await?
            .ok_or_else(|| anyhow!("archive {} vanished after conflict", archive.content_hash))?;
        Ok(Inserted::Existing(existing))
    }

    async fn find_archive_by_hash(&self, content_hash: &str) -> Result<Option<Archive>> {
        let row = sqlx::query(
            "SELECT id, filename, content_hash, year, month, created_at FROM archives WHERE content_hash = ?",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(archive_from_row).transpose()
    }

    async fn archives_for_period(&self, period: Period) -> Result<Vec<Archive>> {
        let rows = sqlx::query(
            r#"
            SELECT id, filename, content_hash, year, month, created_at
            FROM archives
            WHERE year = ? AND month = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(period.year as i64)
        .bind(period.month as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(archive_from_row).collect()
    }

    async fn count_archives(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM archives")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn enable_target(&self, id: &str) -> Result<NotificationTarget> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO notification_targets (id, enabled, updated_at) VALUES (?, 1, ?)
            ON CONFLICT(id) DO UPDATE SET enabled = 1, updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_target(id)
            .await?
            .ok_or_else(|| anyhow!("target {} missing after upsert", id))
    }

    async fn disable_target(&self, id: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE notification_targets SET enabled = 0, updated_at = ? WHERE id = ?")
                .bind(Utc::now().timestamp())
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_target(&self, id: &str) -> Result<Option<NotificationTarget>> {
        let row = sqlx::query(
            r#"
            SELECT id, enabled, last_acknowledged_year, last_acknowledged_month
            FROM notification_targets WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(target_from_row).transpose()
    }

    async fn list_targets(&self) -> Result<Vec<NotificationTarget>> {
        let rows = sqlx::query(
            r#"
            SELECT id, enabled, last_acknowledged_year, last_acknowledged_month
            FROM notification_targets ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(target_from_row).collect()
    }

    async fn advance_acknowledgment(&self, id: &str, period: Period) -> Result<bool> {
        let year = period.year as i64;
        let month = period.month as i64;
        let result = sqlx::query(
            r#"
            UPDATE notification_targets
            SET last_acknowledged_year = ?, last_acknowledged_month = ?, updated_at = ?
            WHERE id = ?
              AND (last_acknowledged_year IS NULL
                   OR last_acknowledged_month IS NULL
                   OR last_acknowledged_year < ?
                   OR (last_acknowledged_year = ? AND last_acknowledged_month < ?))
            "#,
        )
        .bind(year)
        .bind(month)
        .bind(Utc::now().timestamp())
        .bind(id)
        .bind(year)
        .bind(year)
        .bind(month)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
