use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with operator-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has the database locked (e.g., an overlapping cycle)
    #[error("Another ingestion process appears to be holding the database. Let it finish or remove the stale lock.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A configured feed source with its health counters.
///
/// Owned by the source registry: the orchestrator reads a snapshot per cycle
/// via `active_sources()` and writes health fields back through
/// `record_success`/`record_failure`, never directly.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub feed_url: String,
    pub category: Option<String>,
    pub is_active: bool,
    pub language: Option<String>,
    pub update_frequency_minutes: i64,
    pub last_fetched_at: Option<i64>,
    pub last_successful_fetch_at: Option<i64>,
    pub consecutive_failures: i64,
    pub last_failure_reason: Option<String>,
}

/// Source definition from configuration, synced into the registry at startup
#[derive(Debug, Clone)]
pub struct SeedSource {
    pub name: String,
    pub feed_url: String,
    pub category: Option<String>,
    pub language: Option<String>,
    pub update_frequency_minutes: i64,
    pub active: bool,
}

/// A persisted article row.
///
/// Created exactly once per `(source_id, guid)` by the ingestion pipeline.
/// `is_processed`, `is_archived`, and `sentiment` belong to downstream
/// consumers; ingestion writes their defaults and never touches them again.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub source_id: i64,
    pub guid: String,
    pub link: Option<String>,
    pub title: String,
    /// Feed-supplied summary
    pub description: Option<String>,
    /// Feed-supplied body HTML, when the feed carries one
    pub content: Option<String>,
    /// Extracted, sanitized article body; NULL when every extraction tier failed
    pub full_content: Option<String>,
    /// Which extraction tier produced `full_content` ("primary", "relaxed",
    /// "selector-fallback"); NULL alongside a NULL `full_content`
    pub extraction_method: Option<String>,
    pub published: Option<i64>,
    pub author: Option<String>,
    /// JSON-encoded list of category terms
    pub categories: Option<String>,
    pub image_url: Option<String>,
    pub is_processed: bool,
    pub is_archived: bool,
    pub sentiment: Option<String>,
    pub fetched_at: i64,
}
