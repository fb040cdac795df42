//! Batch orchestrator: one ingestion cycle over all active sources.
//!
//! Sources run sequentially — nearly all wall-clock time is spent waiting on
//! per-item HTTP calls, and those *are* parallelized through a bounded
//! worker pool per source. Failure containment is strict: an item failure
//! never fails its source, a source failure never fails the cycle, and the
//! cycle always returns a summary.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::extract::{self, ExtractedArticle};
use crate::feed::{parse_feed, FeedItem, ParseError};
use crate::fetch::{FetchError, Fetcher, MAX_ARTICLE_BYTES, MAX_FEED_BYTES};
use crate::storage::{Database, Source};
use crate::util::decode_body;

/// Outcome of one complete cycle
#[derive(Debug, Default)]
pub struct CycleSummary {
    pub total_sources: usize,
    pub processed_sources: usize,
    pub failed_sources: usize,
    pub new_articles: usize,
    pub source_reports: Vec<SourceReport>,
}

/// Per-source result inside a cycle summary
#[derive(Debug)]
pub struct SourceReport {
    pub source_id: i64,
    pub name: String,
    /// Items the feed offered after the per-source cap
    pub items_seen: usize,
    pub new_articles: usize,
    /// Items persisted without full content because fetch or extraction failed
    pub extraction_failures: usize,
    /// Set when the source failed wholesale (feed fetch/parse)
    pub error: Option<String>,
}

/// Why a whole source failed for this cycle
#[derive(Debug, Error)]
enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Result of one item's fetch+extract+upsert unit of work
struct ItemOutcome {
    created: bool,
    extracted: bool,
}

/// Run one ingestion cycle: poll every active source, fan out per-item work,
/// upsert results, and report.
///
/// `source_filter` narrows the cycle to a single source id (operator
/// convenience). The only error this returns is a failure to read the
/// registry snapshot — a setup-level problem; everything downstream is
/// contained and reported through the summary.
pub async fn run_cycle(
    db: &Database,
    fetcher: &Fetcher,
    config: &Config,
    source_filter: Option<i64>,
) -> Result<CycleSummary> {
    let mut sources = db
        .active_sources()
        .await
        .context("Failed to read the source registry")?;

    if let Some(id) = source_filter {
        sources.retain(|s| s.id == id);
    }

    let mut summary = CycleSummary {
        total_sources: sources.len(),
        ..Default::default()
    };

    tracing::info!(sources = sources.len(), "Starting ingestion cycle");

    for source in &sources {
        let report = process_source(db, fetcher, config, source).await;

        if let Some(reason) = &report.error {
            summary.failed_sources += 1;
            if let Err(e) = db
                .record_failure(source.id, reason, config.disable_after_failures)
                .await
            {
                tracing::warn!(source_id = source.id, error = %e, "Failed to record source failure");
            }
        } else {
            summary.processed_sources += 1;
            if let Err(e) = db.record_success(source.id).await {
                tracing::warn!(source_id = source.id, error = %e, "Failed to record source success");
            }
        }

        summary.new_articles += report.new_articles;
        summary.source_reports.push(report);
    }

    tracing::info!(
        total = summary.total_sources,
        processed = summary.processed_sources,
        failed = summary.failed_sources,
        new_articles = summary.new_articles,
        "Ingestion cycle complete"
    );

    Ok(summary)
}

/// Process a single source, containing every failure into the report.
async fn process_source(
    db: &Database,
    fetcher: &Fetcher,
    config: &Config,
    source: &Source,
) -> SourceReport {
    let mut report = SourceReport {
        source_id: source.id,
        name: source.name.clone(),
        items_seen: 0,
        new_articles: 0,
        extraction_failures: 0,
        error: None,
    };

    let items = match fetch_feed_items(fetcher, config, source).await {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(
                source_id = source.id,
                source = %source.name,
                error = %e,
                "Source failed for this cycle"
            );
            report.error = Some(e.to_string());
            return report;
        }
    };

    report.items_seen = items.len();

    // Bounded worker pool: total concurrent outbound connections stay capped
    // regardless of how many items the feed offered.
    let outcomes: Vec<ItemOutcome> = stream::iter(items)
        .map(|item| process_item(db, fetcher, config, item))
        .buffer_unordered(config.batch_width.max(1))
        .collect()
        .await;

    for outcome in outcomes {
        if outcome.created {
            report.new_articles += 1;
        }
        if !outcome.extracted {
            report.extraction_failures += 1;
        }
    }

    tracing::info!(
        source_id = source.id,
        source = %source.name,
        items = report.items_seen,
        new_articles = report.new_articles,
        extraction_failures = report.extraction_failures,
        "Source processed"
    );

    report
}

/// Fetch and parse a source's feed document, capped to the configured
/// per-source item budget.
async fn fetch_feed_items(
    fetcher: &Fetcher,
    config: &Config,
    source: &Source,
) -> Result<Vec<FeedItem>, SourceError> {
    let body = fetcher
        .fetch(
            &source.feed_url,
            Duration::from_secs(config.feed_timeout_secs),
            MAX_FEED_BYTES,
        )
        .await?;

    let mut items = parse_feed(&body.bytes, source.id)?;

    // Feed order is assumed newest-first; the cap keeps a deep backfill from
    // turning one cycle into hundreds of article fetches.
    if items.len() > config.max_items_per_source {
        items.truncate(config.max_items_per_source);
    }

    Ok(items)
}

/// One unit of worker-pool work: fetch the article page, extract, upsert.
/// Never fails the batch — the item is persisted with feed-only data when
/// fetch or extraction comes up empty.
async fn process_item(
    db: &Database,
    fetcher: &Fetcher,
    config: &Config,
    item: FeedItem,
) -> ItemOutcome {
    let extracted = fetch_and_extract(fetcher, config, &item).await;

    let created = match db
        .insert_article(item.source_id, &item, extracted.as_ref())
        .await
    {
        Ok(created) => created,
        Err(e) => {
            tracing::warn!(
                source_id = item.source_id,
                guid = %item.guid,
                error = %e,
                "Failed to persist article"
            );
            false
        }
    };

    ItemOutcome {
        created,
        extracted: extracted.is_some(),
    }
}

/// Fetch the linked page and run the extraction cascade. `None` covers every
/// failure mode: no link, fetch exhausted, undecodable page, all tiers
/// failed. Each is logged, none propagates.
async fn fetch_and_extract(
    fetcher: &Fetcher,
    config: &Config,
    item: &FeedItem,
) -> Option<ExtractedArticle> {
    let link = item.link.as_deref()?;

    let body = match fetcher
        .fetch(
            link,
            Duration::from_secs(config.article_timeout_secs),
            MAX_ARTICLE_BYTES,
        )
        .await
    {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(url = %link, error = %e, "Article fetch failed, keeping feed data only");
            return None;
        }
    };

    let html = decode_body(&body.bytes, body.content_type.as_deref());
    let url = Url::parse(link).ok()?;

    let extracted = extract::extract(&html, &url, config.min_content_chars);
    if extracted.is_none() {
        tracing::debug!(url = %link, "Extraction exhausted, keeping feed data only");
    }
    extracted
}
