//! Fetch strategy cascade.
//!
//! A single retrieval escalates through header/identity profiles until one
//! returns a usable body: a desktop-browser profile, a profile carrying a
//! `Referer` on the target's own origin (defeats naive hotlink blocks), and
//! finally an optional public reader relay. Retrying across strategies *is*
//! the resilience mechanism — no strategy retries internally; the next
//! scheduled cycle is the outer retry loop.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use crate::util::validate_url;

/// Body cap for feed documents
pub const MAX_FEED_BYTES: usize = 10 * 1024 * 1024; // 10MB
/// Body cap for article pages
pub const MAX_ARTICLE_BYTES: usize = 5 * 1024 * 1024; // 5MB

const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ALTERNATE_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Identity profile used for one fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Plain desktop-browser header profile
    Browser,
    /// Alternate UA plus a Referer on the target's own origin
    SameSiteReferer,
    /// Indirection through a public reader relay
    Relay,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Browser => "browser",
            Strategy::SameSiteReferer => "same-site-referer",
            Strategy::Relay => "relay",
        }
    }
}

/// Errors from a fetch attempt or an exhausted cascade
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL failed validation (not absolute http(s), or private target).
    /// Non-retryable: no strategy is attempted.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Attempt exceeded its timeout budget
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    /// 2xx response with an empty body — treated as failure so blank
    /// documents never reach the extractor or the store
    #[error("Response body was empty")]
    EmptyBody,
    /// Response body exceeded the size cap
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// Every strategy failed; carries the last error and the attempt trail
    #[error("All fetch strategies failed ({attempted}): {last}")]
    Exhausted {
        attempted: String,
        #[source]
        last: Box<FetchError>,
    },
}

/// A successfully fetched body plus which strategy produced it
#[derive(Debug)]
pub struct FetchedBody {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub strategy: Strategy,
}

/// Relay strategy configuration. The URL is rewritten as
/// `<base_url>/<target_url>` the way public reader mirrors expect.
#[derive(Clone)]
pub struct RelayConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
}

/// HTTP retrieval with escalating identity profiles.
///
/// Cancellation is drop-based: every await sits under the per-attempt
/// timeout, so dropping the future owning a `fetch` call aborts the
/// in-flight request immediately.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    relay: Option<RelayConfig>,
    allow_private_networks: bool,
}

impl Fetcher {
    pub fn new(client: reqwest::Client, relay: Option<RelayConfig>) -> Self {
        // Enforce HTTPS for the relay base so the API key cannot leak over
        // cleartext. HTTP is tolerated only for localhost (mock servers).
        let relay = relay.filter(|r| {
            let base = r.base_url.as_str();
            if base.starts_with("https://") {
                return true;
            }
            let is_localhost =
                base.starts_with("http://127.0.0.1") || base.starts_with("http://localhost");
            if !is_localhost {
                tracing::warn!(base_url = %base, "Ignoring non-HTTPS relay base URL");
            }
            is_localhost
        });

        Self {
            client,
            relay,
            allow_private_networks: false,
        }
    }

    /// Permit fetches against localhost/private addresses.
    ///
    /// Only for exercising the cascade against local mock servers; production
    /// callers keep the SSRF guard on.
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.allow_private_networks = allow;
        self
    }

    /// Fetch `url`, escalating through strategies until one returns a 2xx
    /// response with a non-empty body.
    ///
    /// Each attempt is a full request with its own `timeout`; bodies are read
    /// incrementally and capped at `limit` bytes. On total failure the
    /// returned [`FetchError::Exhausted`] carries the last attempt's error
    /// and the names of every strategy tried.
    pub async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        limit: usize,
    ) -> Result<FetchedBody, FetchError> {
        let target = self.check_url(url)?;

        let mut strategies = vec![Strategy::Browser, Strategy::SameSiteReferer];
        if self.relay.is_some() {
            strategies.push(Strategy::Relay);
        }

        let mut attempted: Vec<&'static str> = Vec::with_capacity(strategies.len());
        let mut last_err: Option<FetchError> = None;

        for strategy in strategies {
            attempted.push(strategy.as_str());
            match self.attempt(&target, strategy, timeout, limit).await {
                Ok(body) => {
                    if attempted.len() > 1 {
                        tracing::info!(
                            url = %target,
                            strategy = strategy.as_str(),
                            "Fetch succeeded after strategy escalation"
                        );
                    }
                    return Ok(body);
                }
                Err(e) => {
                    tracing::debug!(
                        url = %target,
                        strategy = strategy.as_str(),
                        error = %e,
                        "Fetch strategy failed"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(FetchError::Exhausted {
            attempted: attempted.join(", "),
            // strategies is never empty, so last_err is always set here
            last: Box::new(last_err.unwrap_or(FetchError::EmptyBody)),
        })
    }

    fn check_url(&self, url: &str) -> Result<Url, FetchError> {
        if self.allow_private_networks {
            let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
            match parsed.scheme() {
                "http" | "https" => Ok(parsed),
                s => Err(FetchError::InvalidUrl(format!("unsupported scheme: {s}"))),
            }
        } else {
            validate_url(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        strategy: Strategy,
        timeout: Duration,
        limit: usize,
    ) -> Result<FetchedBody, FetchError> {
        let request = match strategy {
            Strategy::Browser => self.client.get(url.clone()).headers(browser_headers()),
            Strategy::SameSiteReferer => self
                .client
                .get(url.clone())
                .headers(same_site_headers(url)),
            Strategy::Relay => {
                // Checked before Relay is pushed onto the strategy list
                let relay = self.relay.as_ref().expect("relay strategy without config");
                let relay_url = format!("{}/{}", relay.base_url.trim_end_matches('/'), url);
                let mut req = self.client.get(&relay_url).headers(browser_headers());
                // The key is only ever sent to the official reader hosts, so a
                // custom relay base (tests, self-hosted mirror) never sees it.
                if let Some(key) = &relay.api_key {
                    let is_official = relay_url.starts_with("https://r.jina.ai/")
                        || relay_url.starts_with("https://api.jina.ai/");
                    if is_official {
                        req = req.header(
                            reqwest::header::AUTHORIZATION,
                            format!("Bearer {}", key.expose_secret()),
                        );
                    }
                }
                req
            }
        };

        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| FetchError::Timeout(timeout.as_secs()))?
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let bytes = read_limited_bytes(response, limit).await?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody);
        }

        Ok(FetchedBody {
            bytes,
            content_type,
            strategy,
        })
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DESKTOP_UA));
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers
}

fn same_site_headers(url: &Url) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(ALTERNATE_UA));
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    if let Ok(referer) = HeaderValue::from_str(&origin_of(url)) {
        headers.insert(REFERER, referer);
    }
    headers
}

/// `scheme://host[:port]/` of the target, used as its own Referer
fn origin_of(url: &Url) -> String {
    let mut origin = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        origin.push(':');
        origin.push_str(&port.to_string());
    }
    origin.push('/');
    origin
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
