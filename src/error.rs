use thiserror::Error;

/// Typed error hierarchy for the ingestion core.
///
/// Serializes as a plain string (the downstream pipeline consumes
/// `error.message`-style strings) while giving Rust code typed variants
/// that can be matched or propagated with `?`.
///
/// Per-track conditions (malformed input, catalog unavailable, ambiguous
/// match) are not errors — they are recorded as `ResolutionStatus` values
/// on the raw entry. Only run-level failures surface here.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Track store failure. Fatal to an ingestion run; the caller retries
    /// the run, the core never swallows it.
    #[error("{0}")]
    Store(String),

    /// External catalog failure that escaped the matcher's retry loop.
    #[error("catalog: {0}")]
    Catalog(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    Json(String),

    #[error("{0}")]
    Other(String),
}

/// Serialize as a plain string so pipeline consumers receive the same
/// `"error message"` string the Python tooling already expects.
impl serde::Serialize for IngestError {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

// ── From impls ─────────────────────────────────────────────────────────────

impl From<anyhow::Error> for IngestError {
    fn from(e: anyhow::Error) -> Self {
        IngestError::Store(e.to_string())
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(e: rusqlite::Error) -> Self {
        IngestError::Store(e.to_string())
    }
}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        IngestError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(e: reqwest::Error) -> Self {
        IngestError::Catalog(e.to_string())
    }
}

/// Allows `.map_err(|e| format!("…", e))?` and `ok_or_else(|| format!(…))?`
/// to coerce into IngestError without changing the call sites.
impl From<String> for IngestError {
    fn from(s: String) -> Self {
        IngestError::Other(s)
    }
}

/// Allows `.ok_or("literal string")?` to coerce into IngestError.
impl From<&str> for IngestError {
    fn from(s: &str) -> Self {
        IngestError::Other(s.to_string())
    }
}
