//! Runtime configuration.
//!
//! All tunables live here with serde defaults, so a partial YAML file (or
//! none at all) yields a working configuration.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// SQLite database path. `None` resolves to the per-user data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    pub catalog: CatalogConfig,
    pub matcher: MatcherConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL of the catalog search service.
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Minimum interval between catalog requests (rate limiter base).
    pub min_request_interval_ms: u64,
    /// Candidates requested per search.
    pub search_limit: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8085".to_string(),
            request_timeout_secs: 10,
            connect_timeout_secs: 5,
            min_request_interval_ms: 250,
            search_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum combined similarity to accept a catalog candidate.
    /// Placeholder value; tune against labeled data.
    pub accept_threshold: f64,
    /// Candidates scoring within this margin of the best are ambiguous.
    pub ambiguity_epsilon: f64,
    /// Catalog attempts per entry (first try + retries).
    pub max_attempts: u32,
    /// Sleep before each retry, indexed by retry number.
    pub backoff_secs: Vec<u64>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.82,
            ambiguity_epsilon: 0.04,
            max_attempts: 3,
            backoff_secs: vec![2, 8, 30],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Episodes ingested in parallel; entries within an episode stay
    /// sequential.
    pub max_concurrent_episodes: usize,
    /// Unresolved entries picked up per re-match pass.
    pub rematch_batch_size: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_concurrent_episodes: 4,
            rematch_batch_size: 200,
        }
    }
}

impl CoreConfig {
    /// Load configuration from a YAML file. A missing file yields defaults;
    /// a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the database path: explicit setting, else the per-user data
    /// directory, else the working directory.
    pub fn resolve_database_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return path.clone();
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("setscraper").join("setscraper.db"))
            .unwrap_or_else(|| PathBuf::from("setscraper.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CoreConfig::default();
        assert!(config.matcher.accept_threshold > 0.5);
        assert!(config.matcher.ambiguity_epsilon < config.matcher.accept_threshold);
        assert_eq!(config.matcher.max_attempts, 3);
        assert!(config.ingest.max_concurrent_episodes >= 1);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: CoreConfig =
            serde_yaml::from_str("matcher:\n  accept_threshold: 0.9\n").unwrap();
        assert_eq!(config.matcher.accept_threshold, 0.9);
        assert_eq!(config.matcher.max_attempts, 3);
        assert_eq!(config.catalog.search_limit, 5);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = CoreConfig::load(Path::new("/nonexistent/setscraper.yaml")).unwrap();
        assert_eq!(config.matcher.backoff_secs, vec![2, 8, 30]);
    }
}
