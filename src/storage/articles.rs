use anyhow::Result;

use super::schema::Database;
use super::types::Article;
use crate::extract::ExtractedArticle;
use crate::feed::FeedItem;

impl Database {
    // ========================================================================
    // Dedup / Persistence Gateway
    // ========================================================================

    /// Insert an article if its `(source_id, guid)` identity is new.
    ///
    /// Returns `true` when a row was created, `false` when the identity
    /// already existed. The existing-row case is deliberately a no-op:
    /// re-ingestion never overwrites previously stored content, so a flaky
    /// extraction on a later cycle cannot degrade a good earlier one.
    ///
    /// Uses `INSERT OR IGNORE` against the unique constraint rather than any
    /// in-process lock — concurrent workers racing on the same identity
    /// resolve to exactly one row inside SQLite.
    pub async fn insert_article(
        &self,
        source_id: i64,
        item: &FeedItem,
        extracted: Option<&ExtractedArticle>,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let categories = if item.categories.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&item.categories)?)
        };

        // Extraction may have failed while the feed summary still has value:
        // full_content stays NULL and description carries the feed text.
        let (full_content, extraction_method) = match extracted {
            Some(e) => (Some(e.sanitized_html.as_str()), Some(e.method.as_str())),
            None => (None, None),
        };
        let description = item.summary.as_deref().or(match extracted {
            Some(e) if !e.excerpt.is_empty() => Some(e.excerpt.as_str()),
            _ => None,
        });

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO articles
                (source_id, guid, link, title, description, content, full_content,
                 extraction_method, published, author, categories, image_url, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(source_id)
        .bind(&item.guid)
        .bind(&item.link)
        .bind(&item.title)
        .bind(description)
        .bind(&item.raw_body_html)
        .bind(full_content)
        .bind(extraction_method)
        .bind(item.published)
        .bind(&item.author)
        .bind(categories)
        .bind(&item.image_url)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Total number of persisted articles
    pub async fn article_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// All articles for a source, newest first
    pub async fn articles_for_source(&self, source_id: i64) -> Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT id, source_id, guid, link, title, description, content,
                   full_content, extraction_method, published, author, categories,
                   image_url, is_processed, is_archived, sentiment, fetched_at
            FROM articles
            WHERE source_id = ?
            ORDER BY published DESC, fetched_at DESC
        "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(articles)
    }
}
