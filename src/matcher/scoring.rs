//! Candidate similarity scoring.
//!
//! Per-field similarity combines string edit distance with token overlap:
//! edit distance catches spelling drift ("Boards of Canda"), token overlap
//! catches reordering and partial credits ("Mustard, Migos" vs "Mustard").
//! The weighting and acceptance threshold are tuning placeholders, set
//! conservatively until measured against labeled data.

use std::collections::HashSet;

use strsim::normalized_levenshtein;

use crate::catalog::CatalogCandidate;
use crate::normalize::{normalize_record, NormalizedRecord};

/// Title carries slightly more signal than artist: DJ tracklists misspell
/// artists more often than titles.
pub const TITLE_WEIGHT: f64 = 0.55;
pub const ARTIST_WEIGHT: f64 = 0.45;

/// Jaccard similarity over whitespace tokens (0.0 to 1.0).
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let tokens_a: HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();

    intersection as f64 / union as f64
}

/// Similarity between two normalized key strings: the better of edit
/// distance and token overlap.
pub fn field_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    normalized_levenshtein(a, b).max(token_jaccard(a, b))
}

/// A catalog candidate with its normalized keys and combined score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: CatalogCandidate,
    pub artist_key: String,
    pub title_key: String,
    pub score: f64,
}

/// Score one candidate against a normalized raw record. The candidate's
/// own text goes through the same normalization, so catalog-side featuring
/// and remix annotations do not distort the comparison.
pub fn score_candidate(record: &NormalizedRecord, candidate: &CatalogCandidate) -> ScoredCandidate {
    let norm = normalize_record(&candidate.artist, &candidate.title);
    let score = TITLE_WEIGHT * field_similarity(&record.title_key, &norm.title_key)
        + ARTIST_WEIGHT * field_similarity(&record.artist_key, &norm.artist_key);
    ScoredCandidate {
        candidate: candidate.clone(),
        artist_key: norm.artist_key,
        title_key: norm.title_key,
        score,
    }
}

/// Score all candidates, best first. Ties order by external id so ranking
/// is deterministic.
pub fn rank_candidates(
    record: &NormalizedRecord,
    candidates: &[CatalogCandidate],
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|c| score_candidate(record, c))
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.candidate.external_id.cmp(&b.candidate.external_id))
    });
    scored
}
