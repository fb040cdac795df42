//! Content extraction: HTML document → best-effort readable article.
//!
//! A cascade of tiers runs in order, stopping at the first acceptable result
//! (enough plain text and a non-empty title). Whichever tier wins, its
//! fragment passes through the same sanitization and post-processing, so the
//! stored output never depends on which heuristic happened to fire.

mod readability;
mod sanitize;

pub use sanitize::{fragment_text, sanitize_fragment};

use scraper::{Html, Selector};
use url::Url;

use crate::util::{collapse_whitespace, excerpt};
use readability::{best_candidate_html, ScoreOptions};

/// Minimum plain-text length for an acceptable extraction
pub const MIN_CONTENT_CHARS: usize = 100;

/// Excerpt length in characters
const EXCERPT_CHARS: usize = 300;

/// Selector probe order for the last-resort tier: specific article
/// containers first, generic page regions last.
const FALLBACK_SELECTORS: &[&str] = &[
    "article",
    "[role=\"main\"]",
    ".entry-content",
    ".article-body",
    ".article-content",
    ".post-content",
    ".post-body",
    ".story-body",
    "#content",
    "main",
];

/// Which cascade tier produced a result. Persisted with the article for
/// regression triage: a sudden shift of a source from `primary` to
/// `selector-fallback` usually means its markup changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    Primary,
    Relaxed,
    SelectorFallback,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Primary => "primary",
            ExtractionMethod::Relaxed => "relaxed",
            ExtractionMethod::SelectorFallback => "selector-fallback",
        }
    }
}

/// Best-effort readable article pulled out of one fetched page.
/// Ephemeral: merged into the persisted article row and discarded.
#[derive(Debug, Clone)]
pub struct ExtractedArticle {
    pub title: String,
    /// Retained markup, sanitized against the allow-list
    pub sanitized_html: String,
    pub plain_text: String,
    pub excerpt: String,
    pub byline: Option<String>,
    pub site_name: Option<String>,
    /// Publication timestamp as declared by the page, unparsed
    pub published_time: Option<String>,
    pub method: ExtractionMethod,
    /// Plain-text length in characters — char counts, not DOM nodes, so
    /// thresholds are stable across markup styles
    pub length_chars: usize,
}

/// Extract the readable body of `html`, trying each tier in order.
///
/// Returns `None` when every tier fails or the page offers no title; the
/// caller persists the feed item without full content rather than failing
/// the item.
pub fn extract(html: &str, source_url: &Url, min_chars: usize) -> Option<ExtractedArticle> {
    let document = Html::parse_document(html);
    let meta = probe_metadata(&document, source_url);

    if meta.title.is_empty() {
        tracing::debug!(url = %source_url, "Page offers no usable title, skipping extraction");
        return None;
    }

    // Ordered tiers sharing one contract: give me a raw fragment, or pass.
    // The relaxed tier halves the acceptance threshold along with its
    // internal paragraph threshold.
    let tiers: [(ExtractionMethod, usize); 3] = [
        (ExtractionMethod::Primary, min_chars),
        (ExtractionMethod::Relaxed, min_chars.div_ceil(2)),
        (ExtractionMethod::SelectorFallback, min_chars),
    ];

    for (method, accept_chars) in tiers {
        let Some(fragment) = tier_candidate(&document, method, accept_chars) else {
            continue;
        };

        let sanitized_html = sanitize_fragment(&fragment);
        let plain_text = fragment_text(&sanitized_html);
        let length_chars = plain_text.chars().count();
        if length_chars < accept_chars {
            continue;
        }

        tracing::debug!(
            url = %source_url,
            method = method.as_str(),
            chars = length_chars,
            "Extraction tier accepted"
        );

        return Some(ExtractedArticle {
            title: meta.title,
            excerpt: excerpt(&plain_text, EXCERPT_CHARS),
            plain_text,
            sanitized_html,
            byline: meta.byline,
            site_name: meta.site_name,
            published_time: meta.published_time,
            method,
            length_chars,
        });
    }

    tracing::debug!(url = %source_url, "All extraction tiers exhausted");
    None
}

fn tier_candidate(document: &Html, method: ExtractionMethod, min_chars: usize) -> Option<String> {
    match method {
        ExtractionMethod::Primary => best_candidate_html(document, &ScoreOptions::primary()),
        ExtractionMethod::Relaxed => best_candidate_html(document, &ScoreOptions::relaxed()),
        ExtractionMethod::SelectorFallback => probe_selectors(document, min_chars),
    }
}

/// Probe common article-container selectors, taking the first whose raw text
/// clears the threshold.
fn probe_selectors(document: &Html, min_chars: usize) -> Option<String> {
    for selector_str in FALLBACK_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(el) = document.select(&selector).next() {
            let text = collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "));
            if text.chars().count() >= min_chars {
                return Some(el.html());
            }
        }
    }
    None
}

struct PageMeta {
    title: String,
    byline: Option<String>,
    site_name: Option<String>,
    published_time: Option<String>,
}

fn probe_metadata(document: &Html, source_url: &Url) -> PageMeta {
    let title = meta_content(document, r#"meta[property="og:title"]"#)
        .or_else(|| first_text(document, "title"))
        .or_else(|| first_text(document, "h1"))
        .unwrap_or_default();

    let byline = meta_content(document, r#"meta[name="author"]"#)
        .or_else(|| first_text(document, r#"a[rel="author"]"#))
        .or_else(|| first_text(document, ".byline"));

    let site_name = meta_content(document, r#"meta[property="og:site_name"]"#)
        .or_else(|| source_url.host_str().map(|h| h.to_string()));

    let published_time = meta_content(document, r#"meta[property="article:published_time"]"#);

    PageMeta {
        title,
        byline,
        site_name,
        published_time,
    }
}

fn meta_content(document: &Html, selector_str: &str) -> Option<String> {
    let selector = Selector::parse(selector_str).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(|c| collapse_whitespace(c))
        .find(|c| !c.is_empty())
}

fn first_text(document: &Html, selector_str: &str) -> Option<String> {
    let selector = Selector::parse(selector_str).ok()?;
    document
        .select(&selector)
        .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .find(|t| !t.is_empty())
}
