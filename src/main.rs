use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use std::path::PathBuf;

use newsreel::config::Config;
use newsreel::fetch::{Fetcher, RelayConfig};
use newsreel::pipeline::run_cycle;
use newsreel::storage::{Database, DatabaseError, SeedSource};

#[derive(Parser, Debug)]
#[command(
    name = "newsreel",
    about = "Feed ingestion pipeline: fetch feeds, extract article content, persist deduplicated rows"
)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "FILE", default_value = "newsreel.toml")]
    config: PathBuf,

    /// Path to the SQLite database
    #[arg(long, value_name = "FILE", default_value = "newsreel.db")]
    db: PathBuf,

    /// Restrict the cycle to a single source id
    #[arg(long, value_name = "ID")]
    source_id: Option<i64>,

    /// Override the per-source item cap for this run
    #[arg(long, value_name = "N")]
    max_items: Option<usize>,

    /// Sync sources from config into the registry, then exit without ingesting
    #[arg(long)]
    seed_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Everything up to the cycle itself is setup: failures here exit
    // non-zero. Once the cycle starts, per-source failures are contained and
    // the process still exits 0 with a summary.
    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(n) = args.max_items {
        config.max_items_per_source = n;
    }

    let db_path = args
        .db
        .to_str()
        .context("Invalid UTF-8 in database path")?;
    let db = match Database::open(db_path).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: another ingestion process appears to be running against this database.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let seeds: Vec<SeedSource> = config
        .sources
        .iter()
        .map(|s| SeedSource {
            name: s.name.clone(),
            feed_url: s.feed_url.clone(),
            category: s.category.clone(),
            language: s.language.clone(),
            update_frequency_minutes: s.update_frequency_minutes,
            active: s.active,
        })
        .collect();
    db.sync_sources(&seeds)
        .await
        .context("Failed to sync sources into the registry")?;

    if args.seed_only {
        println!("Synced {} sources.", seeds.len());
        return Ok(());
    }

    // Redirects are followed by reqwest's default policy; per-strategy
    // headers are attached per request by the fetcher.
    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let relay_key = std::env::var("NEWSREEL_RELAY_KEY")
        .ok()
        .or_else(|| config.relay_api_key.clone())
        .map(SecretString::from);
    let relay = if config.relay_base_url.is_empty() {
        None
    } else {
        Some(RelayConfig {
            base_url: config.relay_base_url.clone(),
            api_key: relay_key,
        })
    };
    let fetcher = Fetcher::new(client, relay);

    let summary = run_cycle(&db, &fetcher, &config, args.source_id).await?;

    if summary.total_sources == 0 {
        anyhow::bail!(
            "No active sources to ingest. Add [[sources]] entries to {} and re-run.",
            args.config.display()
        );
    }

    println!(
        "Cycle complete: {}/{} sources processed, {} failed, {} new articles",
        summary.processed_sources,
        summary.total_sources,
        summary.failed_sources,
        summary.new_articles
    );
    for report in &summary.source_reports {
        match &report.error {
            Some(error) => println!("  [{}] {} — FAILED: {}", report.source_id, report.name, error),
            None => println!(
                "  [{}] {} — {} items, {} new, {} without full content",
                report.source_id,
                report.name,
                report.items_seen,
                report.new_articles,
                report.extraction_failures
            ),
        }
    }

    Ok(())
}
