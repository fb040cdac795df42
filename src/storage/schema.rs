use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process has the
    /// database locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to release
        // before returning SQLITE_BUSY. Upsert workers from the bounded pool
        // contend on the single writer; the timeout absorbs that contention.
        // Using pragma() ensures all connections in the pool inherit the setting.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // SQLite is single-writer; 5 connections covers the worker pool's
        // concurrent upserts plus registry reads.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            // Migration errors could also be lock-related
            let error_string = e.to_string().to_lowercase();
            if error_string.contains("database is locked")
                || error_string.contains("database table is locked")
                || error_string.contains("sqlite_busy")
                || error_string.contains("sqlite_locked")
            {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All schema statements use `IF NOT EXISTS`, so re-running against an
    /// existing database is a no-op. If any step fails the transaction rolls
    /// back and the database keeps its previous consistent state.
    async fn migrate(&self) -> Result<()> {
        // Enable foreign keys (per-connection setting, outside the transaction)
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await?;

        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;

        // Source registry: configured feeds plus their health counters
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                feed_url TEXT UNIQUE NOT NULL,
                category TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                language TEXT,
                update_frequency_minutes INTEGER NOT NULL DEFAULT 60,
                last_fetched_at INTEGER,
                last_successful_fetch_at INTEGER,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                last_failure_reason TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Articles: one row per logical article. The UNIQUE(source_id, guid)
        // constraint is the dedup mechanism — concurrent upsert workers race
        // safely to exactly one row through it, with no application locking.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
                guid TEXT NOT NULL,
                link TEXT,
                title TEXT NOT NULL,
                description TEXT,
                content TEXT,
                full_content TEXT,
                extraction_method TEXT,
                published INTEGER,
                author TEXT,
                categories TEXT,
                image_url TEXT,
                is_processed INTEGER NOT NULL DEFAULT 0,
                is_archived INTEGER NOT NULL DEFAULT 0,
                sentiment TEXT,
                fetched_at INTEGER NOT NULL,
                UNIQUE(source_id, guid)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published DESC)",
        )
        .execute(&mut *tx)
        .await?;
        // Downstream consumers poll for unprocessed rows
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_unprocessed ON articles(is_processed) WHERE is_processed = 0",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
