//! End-to-end ingestion cycle tests: mocked feeds and article pages on one
//! side, an in-memory SQLite database on the other.
//!
//! Each test owns its database and mock servers, so tests run isolated and
//! in parallel.

use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use newsreel::config::Config;
use newsreel::fetch::Fetcher;
use newsreel::pipeline::run_cycle;
use newsreel::storage::{Database, SeedSource};

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn test_fetcher() -> Fetcher {
    // No relay; local mock servers need the private-network guard off
    Fetcher::new(reqwest::Client::new(), None).allow_private_networks(true)
}

fn test_config(batch_width: usize) -> Config {
    Config {
        batch_width,
        feed_timeout_secs: 5,
        article_timeout_secs: 5,
        relay_base_url: String::new(),
        ..Config::default()
    }
}

fn seed(name: &str, feed_url: &str) -> SeedSource {
    SeedSource {
        name: name.to_string(),
        feed_url: feed_url.to_string(),
        category: Some("news".to_string()),
        language: Some("en".to_string()),
        update_frequency_minutes: 60,
        active: true,
    }
}

/// RSS document with three items; the second omits its <guid>.
fn three_item_feed(base: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Mock Wire</title>
    <item>
      <guid>mock-1</guid>
      <title>First story</title>
      <link>{base}/stories/1</link>
      <description>Feed summary one</description>
    </item>
    <item>
      <title>Second story</title>
      <link>{base}/stories/2</link>
      <description>Feed summary two</description>
    </item>
    <item>
      <guid>mock-3</guid>
      <title>Third story</title>
      <link>{base}/stories/3</link>
      <description>Feed summary three</description>
    </item>
  </channel>
</rss>"#
    )
}

fn article_page(title: &str) -> String {
    let paragraph =
        "A full paragraph of article body text with plenty of characters to extract. ".repeat(3);
    format!(
        r#"<html><head><title>{title}</title></head>
<body><nav><a href="/">Home</a></nav>
<div class="article-body"><p>{paragraph}</p><p>{paragraph}</p></div>
</body></html>"#
    )
}

async fn mount_feed_and_articles(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(three_item_feed(&server.uri())))
        .mount(server)
        .await;
    for n in 1..=3 {
        Mock::given(method("GET"))
            .and(path(format!("/stories/{n}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(article_page(&format!(
                "Story number {n}"
            ))))
            .mount(server)
            .await;
    }
}

// ============================================================================
// Concrete scenario: 3 items, width-1 pool, idempotent re-run
// ============================================================================

#[tokio::test]
async fn first_cycle_ingests_all_items_second_cycle_is_a_noop() {
    let server = MockServer::start().await;
    mount_feed_and_articles(&server).await;

    let db = test_db().await;
    db.sync_sources(&[seed("Mock Wire", &format!("{}/feed", server.uri()))])
        .await
        .unwrap();

    let config = test_config(1);
    let fetcher = test_fetcher();

    let summary = run_cycle(&db, &fetcher, &config, None).await.unwrap();
    assert_eq!(summary.total_sources, 1);
    assert_eq!(summary.processed_sources, 1);
    assert_eq!(summary.failed_sources, 0);
    assert_eq!(summary.new_articles, 3);

    // Idempotence: unchanged feeds yield zero new rows
    let rerun = run_cycle(&db, &fetcher, &config, None).await.unwrap();
    assert_eq!(rerun.new_articles, 0);
    assert_eq!(rerun.processed_sources, 1);

    assert_eq!(db.article_count().await.unwrap(), 3);
}

#[tokio::test]
async fn guidless_item_is_keyed_by_its_link() {
    let server = MockServer::start().await;
    mount_feed_and_articles(&server).await;

    let db = test_db().await;
    db.sync_sources(&[seed("Mock Wire", &format!("{}/feed", server.uri()))])
        .await
        .unwrap();

    run_cycle(&db, &test_fetcher(), &test_config(5), None)
        .await
        .unwrap();

    let source = &db.active_sources().await.unwrap()[0];
    let articles = db.articles_for_source(source.id).await.unwrap();
    assert_eq!(articles.len(), 3);

    let second_link = format!("{}/stories/2", server.uri());
    assert!(
        articles.iter().any(|a| a.guid == second_link),
        "guid-less item should use its link as identity"
    );
}

#[tokio::test]
async fn identity_is_unique_per_source() {
    let server = MockServer::start().await;
    mount_feed_and_articles(&server).await;

    let db = test_db().await;
    db.sync_sources(&[seed("Mock Wire", &format!("{}/feed", server.uri()))])
        .await
        .unwrap();

    let config = test_config(5);
    let fetcher = test_fetcher();
    run_cycle(&db, &fetcher, &config, None).await.unwrap();
    run_cycle(&db, &fetcher, &config, None).await.unwrap();
    run_cycle(&db, &fetcher, &config, None).await.unwrap();

    let source = &db.active_sources().await.unwrap()[0];
    let articles = db.articles_for_source(source.id).await.unwrap();
    let mut guids: Vec<&str> = articles.iter().map(|a| a.guid.as_str()).collect();
    let total = guids.len();
    guids.sort();
    guids.dedup();
    assert_eq!(guids.len(), total, "no two rows may share (source_id, guid)");
}

// ============================================================================
// Extraction results flow into persisted rows
// ============================================================================

#[tokio::test]
async fn extracted_content_is_persisted_with_its_method() {
    let server = MockServer::start().await;
    mount_feed_and_articles(&server).await;

    let db = test_db().await;
    db.sync_sources(&[seed("Mock Wire", &format!("{}/feed", server.uri()))])
        .await
        .unwrap();

    run_cycle(&db, &test_fetcher(), &test_config(5), None)
        .await
        .unwrap();

    let source = &db.active_sources().await.unwrap()[0];
    let articles = db.articles_for_source(source.id).await.unwrap();
    for article in &articles {
        let full = article.full_content.as_deref().expect("full content extracted");
        assert!(full.contains("article body text"));
        assert!(!full.contains("<nav"));
        assert_eq!(article.extraction_method.as_deref(), Some("primary"));
    }
}

#[tokio::test]
async fn unfetchable_article_still_persists_feed_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(three_item_feed(&server.uri())))
        .mount(&server)
        .await;
    // Story 2 is fine, 1 and 3 are gone
    Mock::given(method("GET"))
        .and(path("/stories/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_page("Story two")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let db = test_db().await;
    db.sync_sources(&[seed("Mock Wire", &format!("{}/feed", server.uri()))])
        .await
        .unwrap();

    let summary = run_cycle(&db, &test_fetcher(), &test_config(5), None)
        .await
        .unwrap();

    // All three items persist; the source still counts as processed
    assert_eq!(summary.new_articles, 3);
    assert_eq!(summary.failed_sources, 0);
    assert_eq!(summary.source_reports[0].extraction_failures, 2);

    let source = &db.active_sources().await.unwrap()[0];
    let articles = db.articles_for_source(source.id).await.unwrap();
    let without_full = articles
        .iter()
        .filter(|a| a.full_content.is_none())
        .count();
    assert_eq!(without_full, 2);
    for article in &articles {
        assert!(article.description.is_some(), "feed summary is kept");
    }
}

// ============================================================================
// Isolation: one broken source never poisons the cycle
// ============================================================================

#[tokio::test]
async fn failing_source_does_not_block_the_others() {
    let healthy = MockServer::start().await;
    mount_feed_and_articles(&healthy).await;

    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;

    let db = test_db().await;
    db.sync_sources(&[
        seed("Broken Wire", &format!("{}/feed", broken.uri())),
        seed("Healthy Wire", &format!("{}/feed", healthy.uri())),
    ])
    .await
    .unwrap();

    let summary = run_cycle(&db, &test_fetcher(), &test_config(5), None)
        .await
        .unwrap();

    assert_eq!(summary.total_sources, 2);
    assert_eq!(summary.processed_sources, 1);
    assert_eq!(summary.failed_sources, 1);
    assert_eq!(summary.new_articles, 3);

    let failed = summary
        .source_reports
        .iter()
        .find(|r| r.name == "Broken Wire")
        .unwrap();
    assert!(failed.error.is_some());

    // Health counters: failure recorded on one, success on the other
    let sources = db.active_sources().await.unwrap();
    let broken_row = sources.iter().find(|s| s.name == "Broken Wire").unwrap();
    assert_eq!(broken_row.consecutive_failures, 1);
    assert!(broken_row.last_failure_reason.is_some());
    assert!(broken_row.last_successful_fetch_at.is_none());

    let healthy_row = sources.iter().find(|s| s.name == "Healthy Wire").unwrap();
    assert_eq!(healthy_row.consecutive_failures, 0);
    assert!(healthy_row.last_successful_fetch_at.is_some());
}

#[tokio::test]
async fn malformed_feed_fails_the_source_not_the_cycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<not really xml"))
        .mount(&server)
        .await;

    let db = test_db().await;
    db.sync_sources(&[seed("Garbled", &format!("{}/feed", server.uri()))])
        .await
        .unwrap();

    let summary = run_cycle(&db, &test_fetcher(), &test_config(5), None)
        .await
        .unwrap();

    assert_eq!(summary.failed_sources, 1);
    assert_eq!(summary.new_articles, 0);
    assert!(summary.source_reports[0].error.is_some());
}

// ============================================================================
// Registry health and the failure breaker
// ============================================================================

#[tokio::test]
async fn success_resets_the_failure_counter() {
    let server = MockServer::start().await;

    // First cycle: feed is down
    let guard = Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount_as_scoped(&server)
        .await;

    let db = test_db().await;
    db.sync_sources(&[seed("Flaky Wire", &format!("{}/feed", server.uri()))])
        .await
        .unwrap();

    let config = test_config(5);
    let fetcher = test_fetcher();
    run_cycle(&db, &fetcher, &config, None).await.unwrap();

    let source = &db.active_sources().await.unwrap()[0];
    assert_eq!(source.consecutive_failures, 1);

    // Second cycle: feed recovers
    drop(guard);
    mount_feed_and_articles(&server).await;
    run_cycle(&db, &fetcher, &config, None).await.unwrap();

    let source = &db.active_sources().await.unwrap()[0];
    assert_eq!(source.consecutive_failures, 0);
    assert!(source.last_failure_reason.is_none());
    assert!(source.last_successful_fetch_at.is_some());
}

#[tokio::test]
async fn breaker_deactivates_source_after_threshold() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let db = test_db().await;
    db.sync_sources(&[seed("Doomed Wire", &format!("{}/feed", server.uri()))])
        .await
        .unwrap();

    let config = Config {
        disable_after_failures: 2,
        ..test_config(5)
    };
    let fetcher = test_fetcher();

    run_cycle(&db, &fetcher, &config, None).await.unwrap();
    assert_eq!(db.active_sources().await.unwrap().len(), 1);

    run_cycle(&db, &fetcher, &config, None).await.unwrap();
    assert!(
        db.active_sources().await.unwrap().is_empty(),
        "source should be deactivated after the second consecutive failure"
    );

    // Re-syncing the config entry reactivates it
    db.sync_sources(&[seed("Doomed Wire", &format!("{}/feed", server.uri()))])
        .await
        .unwrap();
    assert_eq!(db.active_sources().await.unwrap().len(), 1);
}

#[tokio::test]
async fn source_filter_narrows_the_cycle() {
    let a = MockServer::start().await;
    mount_feed_and_articles(&a).await;
    let b = MockServer::start().await;
    mount_feed_and_articles(&b).await;

    let db = test_db().await;
    db.sync_sources(&[
        seed("Wire A", &format!("{}/feed", a.uri())),
        seed("Wire B", &format!("{}/feed", b.uri())),
    ])
    .await
    .unwrap();

    let sources = db.active_sources().await.unwrap();
    let only = sources.iter().find(|s| s.name == "Wire B").unwrap().id;

    let summary = run_cycle(&db, &test_fetcher(), &test_config(5), Some(only))
        .await
        .unwrap();

    assert_eq!(summary.total_sources, 1);
    assert_eq!(summary.new_articles, 3);
    assert_eq!(summary.source_reports[0].name, "Wire B");
}

#[tokio::test]
async fn item_cap_limits_fetches_per_source() {
    let server = MockServer::start().await;
    mount_feed_and_articles(&server).await;

    let db = test_db().await;
    db.sync_sources(&[seed("Mock Wire", &format!("{}/feed", server.uri()))])
        .await
        .unwrap();

    let config = Config {
        max_items_per_source: 2,
        ..test_config(5)
    };
    let summary = run_cycle(&db, &test_fetcher(), &config, None)
        .await
        .unwrap();

    assert_eq!(summary.source_reports[0].items_seen, 2);
    assert_eq!(summary.new_articles, 2);
}
