use feed_rs::parser;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A normalized entry from one feed document.
///
/// Ephemeral: produced per cycle, merged into a persisted article by the
/// orchestrator, then discarded.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub source_id: i64,
    /// Stable per-source identity. Feed-supplied guid when present, else the
    /// item link, else a hash of link|title|published.
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    /// Feed-supplied summary/description text
    pub summary: Option<String>,
    /// Full body HTML when the feed embeds one (content:encoded, Atom content)
    pub raw_body_html: Option<String>,
    pub author: Option<String>,
    pub categories: Vec<String>,
    /// Publication time as unix seconds; `updated` substitutes when absent
    pub published: Option<i64>,
    pub image_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    /// Document is not structurally parseable as RSS/Atom/RDF. The whole
    /// source fails for the cycle; partial recovery from a broken document
    /// is not attempted.
    #[error("Malformed feed document: {0}")]
    Malformed(String),
}

/// Parse a raw feed document into normalized items, in feed order.
///
/// Missing optional fields get defaults (guid ← link, author ← None) rather
/// than failing the item. The caller is responsible for capping the number
/// of items taken per source; everything found is returned here.
pub fn parse_feed(bytes: &[u8], source_id: i64) -> Result<Vec<FeedItem>, ParseError> {
    // Entries without an id get their first link as the generated id, so a
    // guid-less RSS item keeps a stable identity across cycles.
    let feed = parser::Builder::new()
        .id_generator(|links, title, _uri| {
            if let Some(link) = links.first() {
                link.href.clone()
            } else {
                hashed_guid(None, title.as_ref().map(|t| t.content.as_str()), None)
            }
        })
        .build()
        .parse(bytes)
        .map_err(|e| ParseError::Malformed(e.to_string()))?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone());
            let published = entry.published.or(entry.updated).map(|dt| dt.timestamp());
            let summary = entry.summary.map(|s| s.content);
            let raw_body_html = entry.content.and_then(|c| c.body);
            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string());
            let author = entry
                .authors
                .into_iter()
                .map(|p| p.name)
                .find(|n| !n.trim().is_empty());
            let categories: Vec<String> = entry
                .categories
                .into_iter()
                .map(|c| c.label.unwrap_or(c.term))
                .filter(|c| !c.trim().is_empty())
                .collect();
            let image_url = entry
                .media
                .iter()
                .flat_map(|m| m.thumbnails.iter().map(|t| t.image.uri.clone()))
                .next()
                .or_else(|| {
                    entry
                        .media
                        .iter()
                        .flat_map(|m| m.content.iter())
                        .filter_map(|c| c.url.as_ref().map(|u| u.to_string()))
                        .next()
                });

            let guid = normalize_guid(&entry.id, link.as_deref(), &title, published);

            FeedItem {
                source_id,
                guid,
                title,
                link,
                summary,
                raw_body_html,
                author,
                categories,
                published,
                image_url,
            }
        })
        .collect();

    Ok(items)
}

/// Identity of last resort: guid if the feed carried one, else the link,
/// else a content hash so the item still dedups across cycles.
fn normalize_guid(
    existing: &str,
    link: Option<&str>,
    title: &str,
    published: Option<i64>,
) -> String {
    let trimmed = existing.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    if let Some(link) = link {
        if !link.trim().is_empty() {
            return link.trim().to_string();
        }
    }
    hashed_guid(link, Some(title), published)
}

fn hashed_guid(link: Option<&str>, title: Option<&str>, published: Option<i64>) -> String {
    let input = format!(
        "{}|{}|{}",
        link.unwrap_or(""),
        title.unwrap_or(""),
        published.map(|p| p.to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
