//! Track identity resolution and deduplication core for the setscraper
//! pipeline.
//!
//! The scraper (out of scope) supplies raw playlist records; this crate
//! normalizes them, resolves each against the internal track store and the
//! external catalog, and commits episode + track associations. The
//! analytics layer consumes the per-episode outcomes.

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod ingest;
pub mod matcher;
pub mod normalize;
pub mod rate_limit;

use std::sync::Arc;

pub use catalog::{Catalog, CatalogCandidate, CatalogError, HttpCatalog};
pub use config::CoreConfig;
pub use database::{
    CanonicalTrack, Database, Episode, EpisodeOutcome, EpisodeStatus, RawPlaylistRecord,
    RawTrackEntry, ResolutionStatus, ResolvedEntry,
};
pub use error::IngestError;
pub use ingest::{IngestReport, IngestStats, IngestionCoordinator};
pub use matcher::{MatchConfidence, MatchResult, Matcher};
pub use normalize::{normalize_record, NormalizedRecord};
pub use rate_limit::RateLimiter;

/// Wire up the default stack: SQLite store at the configured path and the
/// HTTP catalog client with its rate limiter.
pub fn build_coordinator(
    config: &CoreConfig,
) -> Result<IngestionCoordinator<HttpCatalog>, IngestError> {
    let db_path = config.resolve_database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Arc::new(Database::new(&db_path)?);

    let limiter = RateLimiter::from_millis("catalog", config.catalog.min_request_interval_ms);
    let catalog = Arc::new(HttpCatalog::new(&config.catalog, limiter));

    log::info!("track store at {}", db_path.display());
    Ok(IngestionCoordinator::new(db, catalog, config))
}
