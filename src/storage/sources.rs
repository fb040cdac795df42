use anyhow::Result;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{SeedSource, Source};

const SOURCE_COLUMNS: &str = "id, name, feed_url, category, is_active, language, \
     update_frequency_minutes, last_fetched_at, last_successful_fetch_at, \
     consecutive_failures, last_failure_reason";

impl Database {
    // ========================================================================
    // Source Registry
    // ========================================================================

    /// Sync sources from configuration into the registry.
    ///
    /// Upserts on `feed_url`: new entries are inserted, existing entries get
    /// their descriptive fields and `is_active` refreshed. Health counters
    /// (`consecutive_failures`, timestamps, failure reason) are preserved —
    /// except that re-syncing an entry with `active = true` reactivates a
    /// source the failure breaker disabled, which is the operator's recovery
    /// path.
    pub async fn sync_sources(&self, seeds: &[SeedSource]) -> Result<()> {
        if seeds.is_empty() {
            return Ok(());
        }

        const BATCH_SIZE: usize = 100;
        let mut tx = self.pool.begin().await?;

        for chunk in seeds.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO sources (name, feed_url, category, language, update_frequency_minutes, is_active) ",
            );

            builder.push_values(chunk, |mut b, seed| {
                b.push_bind(&seed.name)
                    .push_bind(&seed.feed_url)
                    .push_bind(&seed.category)
                    .push_bind(&seed.language)
                    .push_bind(seed.update_frequency_minutes)
                    .push_bind(seed.active);
            });

            builder.push(
                " ON CONFLICT(feed_url) DO UPDATE SET \
                 name = excluded.name, \
                 category = excluded.category, \
                 language = excluded.language, \
                 update_frequency_minutes = excluded.update_frequency_minutes, \
                 is_active = excluded.is_active",
            );

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Get the snapshot of sources a cycle should poll
    pub async fn active_sources(&self) -> Result<Vec<Source>> {
        let sources = sqlx::query_as::<_, Source>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE is_active = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(sources)
    }

    /// Look up a single source by id (active or not)
    pub async fn get_source(&self, source_id: i64) -> Result<Option<Source>> {
        let source = sqlx::query_as::<_, Source>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?"
        ))
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(source)
    }

    /// Record a successful cycle for a source: stamp both fetch timestamps,
    /// reset the failure counter, clear the stored failure reason.
    pub async fn record_success(&self, source_id: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE sources SET
                last_fetched_at = ?,
                last_successful_fetch_at = ?,
                consecutive_failures = 0,
                last_failure_reason = NULL
            WHERE id = ?
        "#,
        )
        .bind(now)
        .bind(now)
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed cycle for a source and return the new consecutive
    /// failure count.
    ///
    /// When `disable_after` is positive and the count reaches it, the source
    /// is deactivated; it stays registered (rows and history intact) and a
    /// config re-sync with `active = true` brings it back.
    pub async fn record_failure(
        &self,
        source_id: i64,
        reason: &str,
        disable_after: i64,
    ) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let row: (i64,) = sqlx::query_as(
            r#"
            UPDATE sources SET
                last_fetched_at = ?,
                consecutive_failures = consecutive_failures + 1,
                last_failure_reason = ?
            WHERE id = ?
            RETURNING consecutive_failures
        "#,
        )
        .bind(now)
        .bind(reason)
        .bind(source_id)
        .fetch_one(&self.pool)
        .await?;

        let failures = row.0;
        if disable_after > 0 && failures >= disable_after {
            sqlx::query("UPDATE sources SET is_active = 0 WHERE id = ?")
                .bind(source_id)
                .execute(&self.pool)
                .await?;
            tracing::warn!(
                source_id = source_id,
                failures = failures,
                threshold = disable_after,
                "Source deactivated after repeated failures - re-sync its config entry to retry"
            );
        }

        Ok(failures)
    }
}
