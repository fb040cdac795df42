//! Configuration file parser for newsreel.toml.
//!
//! One TOML file carries both the pipeline knobs and the `[[sources]]` seed
//! list that gets synced into the registry at startup. A missing file yields
//! `Config::default()` (with zero sources); unknown keys are accepted but
//! logged as probable typos.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level pipeline configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified; missing keys fall back to the defaults below.
///
/// Custom Debug impl masks `relay_api_key` so the secret never reaches
/// logs or error output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker-pool width for per-item fetch+extract within one source.
    pub batch_width: usize,

    /// Cap on items taken per source per cycle (feeds are assumed
    /// newest-first).
    pub max_items_per_source: usize,

    /// Timeout budget per feed-fetch attempt, in seconds.
    pub feed_timeout_secs: u64,

    /// Timeout budget per article-fetch attempt, in seconds.
    pub article_timeout_secs: u64,

    /// Minimum extracted plain-text length to accept a tier's result.
    pub min_content_chars: usize,

    /// Deactivate a source after this many consecutive failed cycles.
    /// 0 disables the breaker (retry forever).
    pub disable_after_failures: i64,

    /// Base URL of the public reader relay used as the last fetch strategy.
    /// Empty string disables the relay strategy entirely.
    pub relay_base_url: String,

    /// Relay API key (the NEWSREEL_RELAY_KEY env var takes precedence).
    pub relay_api_key: Option<String>,

    /// Feed sources synced into the registry at startup.
    pub sources: Vec<SourceEntry>,
}

/// One `[[sources]]` entry
#[derive(Clone, Debug, Deserialize)]
pub struct SourceEntry {
    pub name: String,
    pub feed_url: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_update_frequency")]
    pub update_frequency_minutes: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_update_frequency() -> i64 {
    60
}

fn default_active() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_width: 5,
            max_items_per_source: 10,
            feed_timeout_secs: 30,
            article_timeout_secs: 10,
            min_content_chars: 100,
            disable_after_failures: 10,
            relay_base_url: "https://r.jina.ai".to_string(),
            relay_api_key: None,
            sources: Vec::new(),
        }
    }
}

/// Mask relay_api_key in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("batch_width", &self.batch_width)
            .field("max_items_per_source", &self.max_items_per_source)
            .field("feed_timeout_secs", &self.feed_timeout_secs)
            .field("article_timeout_secs", &self.article_timeout_secs)
            .field("min_content_chars", &self.min_content_chars)
            .field("disable_after_failures", &self.disable_after_failures)
            .field("relay_base_url", &self.relay_base_url)
            .field(
                "relay_api_key",
                &self.relay_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("sources", &self.sources.len())
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to bound memory use on a corrupted
        // or mistaken path.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to flag probable typos
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "batch_width",
                "max_items_per_source",
                "feed_timeout_secs",
                "article_timeout_secs",
                "min_content_chars",
                "disable_after_failures",
                "relay_base_url",
                "relay_api_key",
                "sources",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            batch_width = config.batch_width,
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
