//! External catalog client.
//!
//! Calls the catalog's REST search API to resolve raw text into candidate
//! tracks. The catalog is treated as unreliable by design: timeouts, rate
//! limits, and server errors surface as retryable [`CatalogError::Unavailable`]
//! conditions; everything else is terminal for the request.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::CatalogConfig;
use crate::rate_limit::RateLimiter;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Transient: the caller may retry with backoff.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    /// Terminal for this request: retrying will not help.
    #[error("catalog rejected request: {0}")]
    Rejected(String),
}

impl CatalogError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// One candidate track returned by a catalog search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogCandidate {
    pub external_id: String,
    pub artist: String,
    pub title: String,
    /// Popularity/confidence metadata when the catalog exposes it; used
    /// only as a tiebreaker.
    pub popularity: Option<i64>,
}

/// Lookup-by-text capability of the external catalog.
pub trait Catalog: Send + Sync {
    fn search(
        &self,
        artist: &str,
        title: &str,
    ) -> impl Future<Output = Result<Vec<CatalogCandidate>, CatalogError>> + Send;
}

/// HTTP implementation against the catalog search service.
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
    search_limit: u32,
    /// Serializes requests and paces them; injected, not global.
    limiter: Mutex<RateLimiter>,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig, limiter: RateLimiter) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            search_limit: config.search_limit,
            limiter: Mutex::new(limiter),
        }
    }

    async fn do_search(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Vec<CatalogCandidate>, CatalogError> {
        let url = format!("{}/search", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&SearchQuery {
                artist,
                title,
                limit: self.search_limit,
            })
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(CatalogError::Unavailable(format!(
                "catalog returned {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Rejected(format!(
                "catalog returned {status}: {body}"
            )));
        }

        let data: SearchResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Rejected(format!("failed to parse response: {e}")))?;

        Ok(candidates_from_results(data.results.unwrap_or_default()))
    }
}

impl Catalog for HttpCatalog {
    async fn search(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Vec<CatalogCandidate>, CatalogError> {
        let mut limiter = self.limiter.lock().await;
        limiter.wait_if_needed().await;

        log::debug!("catalog search: artist={artist:?} title={title:?}");
        let result = self.do_search(artist, title).await;

        match &result {
            Ok(_) => limiter.report_success(),
            Err(e) if e.is_retryable() => limiter.report_failure(),
            Err(_) => {}
        }
        result
    }
}

/// Drop result rows missing any identity field rather than failing the
/// whole response.
fn candidates_from_results(results: Vec<SearchResult>) -> Vec<CatalogCandidate> {
    results
        .into_iter()
        .filter_map(|r| match (r.id, r.artist, r.title) {
            (Some(external_id), Some(artist), Some(title)) => Some(CatalogCandidate {
                external_id,
                artist,
                title,
                popularity: r.popularity,
            }),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct SearchQuery<'a> {
    artist: &'a str,
    title: &'a str,
    limit: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Option<Vec<SearchResult>>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: Option<String>,
    artist: Option<String>,
    title: Option<String>,
    #[serde(default)]
    popularity: Option<i64>,
}
