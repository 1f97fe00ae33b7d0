//! Candidate matching.
//!
//! Resolves a normalized raw record to a canonical track: exact key lookup
//! against the store first (never touches the catalog), then a catalog
//! search with bounded retries, similarity scoring, and threshold
//! acceptance. Close calls are never guessed: candidates within epsilon of
//! each other fall back to catalog popularity, and failing that the entry
//! is recorded as ambiguous for a later pass.

pub mod scoring;

use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{Catalog, CatalogError};
use crate::config::MatcherConfig;
use crate::database::{Database, NewCanonicalTrack, ResolutionStatus};
use crate::error::IngestError;
use crate::normalize::NormalizedRecord;

use scoring::{rank_candidates, ScoredCandidate};

/// How a match was established.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchConfidence {
    /// Normalized keys matched an existing canonical track exactly.
    Exact,
    /// Accepted catalog candidate with this combined similarity score.
    Scored(f64),
}

/// Transient outcome of matching one record. Not persisted; the resolution
/// it implies is written to the raw entry by [`Matcher::resolve`].
#[derive(Debug, Clone)]
pub enum MatchResult {
    Matched {
        canonical_id: i64,
        confidence: MatchConfidence,
    },
    /// Accepted catalog candidate with no canonical row yet.
    CreateCanonical { new: NewCanonicalTrack, score: f64 },
    Unresolved { reason: ResolutionStatus },
}

/// The committed resolution for one raw entry.
#[derive(Debug, Clone, Copy)]
pub struct Resolution {
    pub canonical_id: Option<i64>,
    pub status: ResolutionStatus,
}

/// Episode context carried alongside a record for logging and future
/// date-aware scoring.
#[derive(Debug, Clone, Copy)]
pub struct EpisodeContext<'a> {
    pub episode_external_id: &'a str,
    pub show_name: Option<&'a str>,
}

pub struct Matcher<C: Catalog> {
    db: Arc<Database>,
    catalog: Arc<C>,
    config: MatcherConfig,
}

impl<C: Catalog> Matcher<C> {
    pub fn new(db: Arc<Database>, catalog: Arc<C>, config: MatcherConfig) -> Self {
        Self {
            db,
            catalog,
            config,
        }
    }

    /// Resolve one record and commit any canonical-track creation it
    /// implies. Only store failures surface as errors; every per-record
    /// condition becomes an unresolved status.
    pub async fn resolve(
        &self,
        record: &NormalizedRecord,
        ctx: EpisodeContext<'_>,
    ) -> Result<Resolution, IngestError> {
        match self.match_record(record, ctx).await? {
            MatchResult::Matched {
                canonical_id,
                confidence,
            } => Ok(Resolution {
                canonical_id: Some(canonical_id),
                status: match confidence {
                    MatchConfidence::Exact => ResolutionStatus::ResolvedExact,
                    MatchConfidence::Scored(_) => ResolutionStatus::ResolvedCatalog,
                },
            }),
            MatchResult::CreateCanonical { new, score } => {
                // First-writer-wins: a concurrent creation of the same
                // external id resolves inside the store's conflict upsert,
                // and we adopt whichever row won.
                let canonical_id = self.db.upsert_canonical_track(&new)?;
                log::info!(
                    "episode {}: accepted catalog candidate {:?} (score {:.3}) as canonical {}",
                    ctx.episode_external_id,
                    new.external_id.as_deref().unwrap_or("-"),
                    score,
                    canonical_id
                );
                Ok(Resolution {
                    canonical_id: Some(canonical_id),
                    status: ResolutionStatus::ResolvedCatalog,
                })
            }
            MatchResult::Unresolved { reason } => Ok(Resolution {
                canonical_id: None,
                status: reason,
            }),
        }
    }

    /// Pure matching phase: no writes.
    async fn match_record(
        &self,
        record: &NormalizedRecord,
        ctx: EpisodeContext<'_>,
    ) -> Result<MatchResult, IngestError> {
        if record.is_empty() {
            return Ok(MatchResult::Unresolved {
                reason: ResolutionStatus::UnresolvedMalformed,
            });
        }

        // Exact normalized-key hit short-circuits: no catalog traffic.
        if let Some(track) = self
            .db
            .find_canonical_by_key(&record.artist_key, &record.title_key)?
        {
            return Ok(MatchResult::Matched {
                canonical_id: track.id,
                confidence: MatchConfidence::Exact,
            });
        }

        let candidates = match self.search_with_retry(record).await {
            Ok(candidates) => candidates,
            Err(e) if e.is_retryable() => {
                log::warn!(
                    "episode {}: catalog unavailable for {:?} / {:?}, leaving unresolved: {}",
                    ctx.episode_external_id,
                    record.raw_artist,
                    record.raw_title,
                    e
                );
                return Ok(MatchResult::Unresolved {
                    reason: ResolutionStatus::UnresolvedCatalogUnavailable,
                });
            }
            Err(e) => {
                log::warn!(
                    "episode {}: catalog rejected query for {:?} / {:?}: {}",
                    ctx.episode_external_id,
                    record.raw_artist,
                    record.raw_title,
                    e
                );
                return Ok(MatchResult::Unresolved {
                    reason: ResolutionStatus::UnresolvedNoMatch,
                });
            }
        };

        match self.select_candidate(record, candidates) {
            MatchResult::CreateCanonical { new, score } => {
                // The accepted catalog entity may already be canonical under
                // a different normalized spelling.
                if let Some(external_id) = new.external_id.as_deref() {
                    if let Some(existing) = self.db.find_canonical_by_external_id(external_id)? {
                        return Ok(MatchResult::Matched {
                            canonical_id: existing.id,
                            confidence: MatchConfidence::Scored(score),
                        });
                    }
                }
                Ok(MatchResult::CreateCanonical { new, score })
            }
            other => Ok(other),
        }
    }

    /// Bounded retry with backoff, only on retryable catalog conditions.
    async fn search_with_retry(
        &self,
        record: &NormalizedRecord,
    ) -> Result<Vec<crate::catalog::CatalogCandidate>, CatalogError> {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 0..max_attempts {
            match self
                .catalog
                .search(&record.artist_key, &record.title_key)
                .await
            {
                Ok(candidates) => return Ok(candidates),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self
                        .config
                        .backoff_secs
                        .get(attempt as usize)
                        .copied()
                        .unwrap_or_else(|| self.config.backoff_secs.last().copied().unwrap_or(30));
                    log::warn!(
                        "catalog attempt {} failed, retrying in {}s: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!()
    }

    /// Threshold acceptance with epsilon tie-break.
    fn select_candidate(
        &self,
        record: &NormalizedRecord,
        candidates: Vec<crate::catalog::CatalogCandidate>,
    ) -> MatchResult {
        let ranked = rank_candidates(record, &candidates);

        let Some(best) = ranked.first() else {
            return MatchResult::Unresolved {
                reason: ResolutionStatus::UnresolvedNoMatch,
            };
        };

        if best.score < self.config.accept_threshold {
            return MatchResult::Unresolved {
                reason: ResolutionStatus::UnresolvedNoMatch,
            };
        }

        let close: Vec<&ScoredCandidate> = ranked
            .iter()
            .take_while(|s| best.score - s.score <= self.config.ambiguity_epsilon)
            .collect();

        let chosen = match pick_among_close(&close) {
            Some(chosen) => chosen,
            None => {
                log::info!(
                    "ambiguous match for {:?} / {:?}: {} candidates within epsilon",
                    record.raw_artist,
                    record.raw_title,
                    close.len()
                );
                return MatchResult::Unresolved {
                    reason: ResolutionStatus::UnresolvedAmbiguous,
                };
            }
        };

        MatchResult::CreateCanonical {
            new: NewCanonicalTrack {
                artist_key: chosen.artist_key.clone(),
                title_key: chosen.title_key.clone(),
                display_artist: chosen.candidate.artist.clone(),
                display_title: chosen.candidate.title.clone(),
                external_id: Some(chosen.candidate.external_id.clone()),
                popularity: chosen.candidate.popularity,
            },
            score: chosen.score,
        }
    }
}

/// Among epsilon-close candidates, pick the strictly most popular one.
/// Without popularity metadata on every contender there is no defensible
/// pick, and the answer is "ambiguous" rather than a guess.
fn pick_among_close<'a>(close: &[&'a ScoredCandidate]) -> Option<&'a ScoredCandidate> {
    match close {
        [] => None,
        [single] => Some(*single),
        _ => {
            if close.iter().any(|s| s.candidate.popularity.is_none()) {
                return None;
            }
            let max = close.iter().filter_map(|s| s.candidate.popularity).max()?;
            let mut at_max = close
                .iter()
                .copied()
                .filter(|s| s.candidate.popularity == Some(max));
            let winner = at_max.next()?;
            if at_max.next().is_some() {
                None
            } else {
                Some(winner)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogCandidate;
    use crate::normalize::normalize_record;

    fn scored(id: &str, score: f64, popularity: Option<i64>) -> ScoredCandidate {
        let record = normalize_record("a", "b");
        let mut s = scoring::score_candidate(
            &record,
            &CatalogCandidate {
                external_id: id.to_string(),
                artist: "a".to_string(),
                title: "b".to_string(),
                popularity,
            },
        );
        s.score = score;
        s
    }

    #[test]
    fn single_close_candidate_wins() {
        let a = scored("cat:1", 0.9, None);
        assert_eq!(
            pick_among_close(&[&a]).map(|s| s.candidate.external_id.as_str()),
            Some("cat:1")
        );
    }

    #[test]
    fn popularity_breaks_ties() {
        let a = scored("cat:1", 0.90, Some(30));
        let b = scored("cat:2", 0.89, Some(80));
        assert_eq!(
            pick_among_close(&[&a, &b]).map(|s| s.candidate.external_id.as_str()),
            Some("cat:2")
        );
    }

    #[test]
    fn missing_popularity_is_ambiguous() {
        let a = scored("cat:1", 0.90, Some(30));
        let b = scored("cat:2", 0.89, None);
        assert!(pick_among_close(&[&a, &b]).is_none());
    }

    #[test]
    fn equal_popularity_is_ambiguous() {
        let a = scored("cat:1", 0.90, Some(50));
        let b = scored("cat:2", 0.89, Some(50));
        assert!(pick_among_close(&[&a, &b]).is_none());
    }
}
