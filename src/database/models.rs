use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Fetched,
    Normalizing,
    Matching,
    Committed,
    PartiallyResolved,
}

impl Default for EpisodeStatus {
    fn default() -> Self {
        Self::Fetched
    }
}

impl std::fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetched => write!(f, "fetched"),
            Self::Normalizing => write!(f, "normalizing"),
            Self::Matching => write!(f, "matching"),
            Self::Committed => write!(f, "committed"),
            Self::PartiallyResolved => write!(f, "partially_resolved"),
        }
    }
}

impl From<String> for EpisodeStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "fetched" => Self::Fetched,
            "normalizing" => Self::Normalizing,
            "matching" => Self::Matching,
            "committed" => Self::Committed,
            "partially_resolved" => Self::PartiallyResolved,
            _ => Self::Fetched,
        }
    }
}

impl EpisodeStatus {
    /// Terminal states survive across runs; everything else is transient
    /// bookkeeping within a single ingestion pass.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::PartiallyResolved)
    }
}

/// Per-entry resolution outcome, persisted on the raw entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Pending,
    ResolvedExact,
    ResolvedCatalog,
    UnresolvedNoMatch,
    UnresolvedAmbiguous,
    UnresolvedCatalogUnavailable,
    UnresolvedMalformed,
}

impl Default for ResolutionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::ResolvedExact => write!(f, "resolved_exact"),
            Self::ResolvedCatalog => write!(f, "resolved_catalog"),
            Self::UnresolvedNoMatch => write!(f, "unresolved_no_match"),
            Self::UnresolvedAmbiguous => write!(f, "unresolved_ambiguous"),
            Self::UnresolvedCatalogUnavailable => write!(f, "unresolved_catalog_unavailable"),
            Self::UnresolvedMalformed => write!(f, "unresolved_malformed"),
        }
    }
}

impl From<String> for ResolutionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => Self::Pending,
            "resolved_exact" => Self::ResolvedExact,
            "resolved_catalog" => Self::ResolvedCatalog,
            "unresolved_no_match" => Self::UnresolvedNoMatch,
            "unresolved_ambiguous" => Self::UnresolvedAmbiguous,
            "unresolved_catalog_unavailable" => Self::UnresolvedCatalogUnavailable,
            "unresolved_malformed" => Self::UnresolvedMalformed,
            _ => Self::Pending,
        }
    }
}

impl ResolutionStatus {
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::ResolvedExact | Self::ResolvedCatalog)
    }

    /// Whether a later re-match pass should pick this entry up again.
    /// Malformed input will not improve on retry.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Pending
                | Self::UnresolvedNoMatch
                | Self::UnresolvedAmbiguous
                | Self::UnresolvedCatalogUnavailable
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub external_id: String,
    pub channel: Option<String>,
    pub show_name: Option<String>,
    pub episode_title: Option<String>,
    pub broadcast_at: Option<String>,
    pub ingested_at: String,
    pub status: EpisodeStatus,
}

/// An as-scraped playlist line. Belongs to exactly one episode and is never
/// deduplicated across episodes: two plays of the same song in different
/// episodes are two rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTrackEntry {
    pub id: i64,
    pub episode_id: i64,
    pub position: i64,
    pub raw_artist: String,
    pub raw_title: String,
    pub artist_key: Option<String>,
    pub title_key: Option<String>,
    pub canonical_track_id: Option<i64>,
    pub resolution_status: ResolutionStatus,
}

/// The deduplicated track identity shared by every raw entry that resolves
/// to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalTrack {
    pub id: i64,
    pub artist_key: String,
    pub title_key: String,
    pub display_artist: String,
    pub display_title: String,
    pub external_id: Option<String>,
    pub popularity: Option<i64>,
    /// Reserved for the downstream analysis layer; never written here.
    pub audio_features_json: Option<String>,
    pub created_at: String,
}

/// Input for `Database::upsert_canonical_track`.
#[derive(Debug, Clone)]
pub struct NewCanonicalTrack {
    pub artist_key: String,
    pub title_key: String,
    pub display_artist: String,
    pub display_title: String,
    pub external_id: Option<String>,
    pub popularity: Option<i64>,
}

/// Input boundary: one scraped playlist line as delivered by the scraper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPlaylistRecord {
    pub episode_external_id: String,
    pub channel: Option<String>,
    pub show_name: Option<String>,
    pub episode_title: Option<String>,
    pub broadcast_at: Option<DateTime<Utc>>,
    pub position: i64,
    pub raw_artist: String,
    pub raw_title: String,
}

/// Output boundary: one playlist position with its resolved identity,
/// consumed by the analytics layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEntry {
    pub position: i64,
    pub canonical_track_id: Option<i64>,
    pub resolution_status: ResolutionStatus,
}

/// Output boundary: the terminal result of ingesting one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeOutcome {
    pub episode_id: i64,
    pub external_id: String,
    pub status: EpisodeStatus,
    pub entries: Vec<ResolvedEntry>,
}
