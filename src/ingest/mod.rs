//! Ingestion coordination.
//!
//! Drives scraped playlist records through normalize → match → commit, one
//! state machine per episode: `Fetched → Normalizing → Matching →
//! Committed | PartiallyResolved`. Entries within an episode run in
//! position order so later lines reuse canonical tracks created earlier in
//! the same pass; independent episodes run in parallel. A single track's
//! failure never aborts its episode — only store failure is fatal to a run.


use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::{CoreConfig, IngestConfig};
use crate::database::{
    Database, EpisodeOutcome, EpisodeStatus, RawPlaylistRecord, ResolutionStatus,
};
use crate::error::IngestError;
use crate::matcher::{EpisodeContext, Matcher};
use crate::normalize::normalize_record;

/// Run summary for the pipeline's logs and the downstream report.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestStats {
    pub episodes: usize,
    pub committed: usize,
    pub partially_resolved: usize,
    /// Episodes skipped as already committed (idempotent re-run).
    pub skipped: usize,
    /// Episodes dropped for a missing/blank external id.
    pub invalid: usize,
    pub entries: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

impl IngestStats {
    fn absorb_outcome(&mut self, outcome: &EpisodeOutcome) {
        self.episodes += 1;
        match outcome.status {
            EpisodeStatus::Committed => self.committed += 1,
            EpisodeStatus::PartiallyResolved => self.partially_resolved += 1,
            _ => {}
        }
        self.entries += outcome.entries.len();
        for entry in &outcome.entries {
            if entry.resolution_status.is_resolved() {
                self.resolved += 1;
            } else {
                self.unresolved += 1;
            }
        }
    }
}

/// Everything a run produced: per-episode outcomes plus the totals.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub outcomes: Vec<EpisodeOutcome>,
    pub stats: IngestStats,
}

pub struct IngestionCoordinator<C: Catalog> {
    db: Arc<Database>,
    matcher: Matcher<C>,
    config: IngestConfig,
}

impl<C: Catalog> IngestionCoordinator<C> {
    pub fn new(db: Arc<Database>, catalog: Arc<C>, config: &CoreConfig) -> Self {
        let matcher = Matcher::new(db.clone(), catalog, config.matcher.clone());
        Self {
            db,
            matcher,
            config: config.ingest.clone(),
        }
    }

    /// Ingest a batch of raw records spanning any number of episodes.
    /// Episodes run in parallel (bounded); records with a blank episode id
    /// are dropped with a warning, mirroring the old CSV cleaning step.
    pub async fn ingest_all(
        &self,
        records: Vec<RawPlaylistRecord>,
        force: bool,
    ) -> Result<IngestReport, IngestError> {
        let run_id = Uuid::new_v4();
        let mut stats = IngestStats::default();

        // Group by episode, keeping first-seen order deterministic.
        let mut by_episode: BTreeMap<String, Vec<RawPlaylistRecord>> = BTreeMap::new();
        for record in records {
            if record.episode_external_id.trim().is_empty() {
                log::warn!(
                    "[run {run_id}] dropping record with blank episode id: {:?} / {:?}",
                    record.raw_artist,
                    record.raw_title
                );
                stats.invalid += 1;
                continue;
            }
            by_episode
                .entry(record.episode_external_id.clone())
                .or_default()
                .push(record);
        }

        log::info!(
            "[run {run_id}] ingesting {} episodes ({} max in flight)",
            by_episode.len(),
            self.config.max_concurrent_episodes
        );

        let results: Vec<Result<(EpisodeOutcome, bool), IngestError>> =
            stream::iter(by_episode.into_values())
                .map(|episode_records| self.ingest_episode_inner(episode_records, force))
                .buffer_unordered(self.config.max_concurrent_episodes.max(1))
                .collect()
                .await;

        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            let (outcome, skipped) = result?;
            if skipped {
                stats.skipped += 1;
            }
            stats.absorb_outcome(&outcome);
            outcomes.push(outcome);
        }
        outcomes.sort_by(|a, b| a.external_id.cmp(&b.external_id));

        log::info!(
            "[run {run_id}] done: {} episodes ({} committed, {} partial, {} skipped), {} entries ({} resolved, {} unresolved)",
            stats.episodes,
            stats.committed,
            stats.partially_resolved,
            stats.skipped,
            stats.entries,
            stats.resolved,
            stats.unresolved
        );

        Ok(IngestReport { outcomes, stats })
    }

    /// Ingest one episode's records. Safe no-op when the episode is already
    /// committed, unless `force` re-resolves every entry.
    pub async fn ingest_episode(
        &self,
        records: Vec<RawPlaylistRecord>,
        force: bool,
    ) -> Result<EpisodeOutcome, IngestError> {
        let (outcome, _skipped) = self.ingest_episode_inner(records, force).await?;
        Ok(outcome)
    }

    async fn ingest_episode_inner(
        &self,
        mut records: Vec<RawPlaylistRecord>,
        force: bool,
    ) -> Result<(EpisodeOutcome, bool), IngestError> {
        let first = records
            .first()
            .ok_or_else(|| IngestError::Other("empty episode batch".to_string()))?;
        let external_id = first.episode_external_id.trim().to_string();
        if external_id.is_empty() {
            return Err(IngestError::Other("blank episode external id".to_string()));
        }
        let channel = first.channel.clone();
        let show_name = first.show_name.clone();
        let episode_title = first.episode_title.clone();
        let broadcast_at = first.broadcast_at.map(|ts| ts.to_rfc3339());

        // Committed episodes are done; re-running is a no-op unless forced.
        if !force {
            if let Some(existing) = self.db.get_episode_by_external_id(&external_id)? {
                if existing.status == EpisodeStatus::Committed {
                    log::info!("episode {external_id} already committed, skipping");
                    return Ok((self.db.episode_outcome(existing.id)?, true));
                }
            }
        }

        let (episode_id, created) = self.db.upsert_episode(
            &external_id,
            channel.as_deref(),
            show_name.as_deref(),
            episode_title.as_deref(),
            broadcast_at.as_deref(),
        )?;
        log::info!(
            "episode {external_id} ({}) with {} records",
            if created { "new" } else { "re-ingest" },
            records.len()
        );

        // ── Normalizing ────────────────────────────────────────────────────
        self.db
            .set_episode_status(episode_id, EpisodeStatus::Normalizing)?;

        records.sort_by_key(|r| r.position);
        let mut normalized = Vec::with_capacity(records.len());
        for record in &records {
            let norm = normalize_record(&record.raw_artist, &record.raw_title);
            let raw_id = self.db.upsert_raw_entry(
                episode_id,
                record.position,
                &record.raw_artist,
                &record.raw_title,
                if norm.artist_key.is_empty() {
                    None
                } else {
                    Some(&norm.artist_key)
                },
                if norm.title_key.is_empty() {
                    None
                } else {
                    Some(&norm.title_key)
                },
            )?;
            normalized.push((raw_id, norm));
        }

        // ── Matching ───────────────────────────────────────────────────────
        self.db
            .set_episode_status(episode_id, EpisodeStatus::Matching)?;

        // Prior statuses, so a re-run only revisits what needs it.
        let prior: BTreeMap<i64, ResolutionStatus> = self
            .db
            .get_raw_entries(episode_id)?
            .into_iter()
            .map(|e| (e.id, e.resolution_status))
            .collect();

        let ctx = EpisodeContext {
            episode_external_id: &external_id,
            show_name: show_name.as_deref(),
        };

        // Sequential, in position order: later entries see canonical tracks
        // created earlier in this pass.
        for (raw_id, norm) in &normalized {
            if !force {
                if let Some(status) = prior.get(raw_id) {
                    if status.is_resolved() {
                        continue;
                    }
                }
            }
            let resolution = self.matcher.resolve(norm, ctx).await?;
            self.db
                .link_raw_entry(*raw_id, resolution.canonical_id, resolution.status)?;
        }

        let (outcome, _) = self.finalize_episode(episode_id)?;
        Ok((outcome, false))
    }

    /// Set the terminal status from the stored entries and return the
    /// outcome.
    fn finalize_episode(&self, episode_id: i64) -> Result<(EpisodeOutcome, bool), IngestError> {
        let entries = self.db.get_raw_entries(episode_id)?;
        let all_resolved = !entries.is_empty()
            && entries.iter().all(|e| e.resolution_status.is_resolved());
        let status = if all_resolved {
            EpisodeStatus::Committed
        } else {
            EpisodeStatus::PartiallyResolved
        };
        self.db.set_episode_status(episode_id, status)?;

        let outcome = self.db.episode_outcome(episode_id)?;
        log::info!(
            "episode {} finished as {} ({}/{} resolved)",
            outcome.external_id,
            status,
            outcome
                .entries
                .iter()
                .filter(|e| e.resolution_status.is_resolved())
                .count(),
            outcome.entries.len()
        );
        Ok((outcome, all_resolved))
    }

    /// Later-pass re-match of entries left unresolved by earlier runs
    /// (catalog outages, ambiguous scores, no-match). Episodes whose last
    /// unresolved entry clears flip to `Committed`. Returns the number of
    /// entries that resolved this pass.
    pub async fn rematch_unresolved(&self) -> Result<usize, IngestError> {
        let batch = self
            .db
            .unresolved_entries(self.config.rematch_batch_size)?;
        if batch.is_empty() {
            return Ok(0);
        }
        log::info!("re-match pass over {} unresolved entries", batch.len());

        let mut resolved = 0usize;
        let mut touched_episodes: Vec<i64> = Vec::new();

        for item in batch {
            let norm = normalize_record(&item.entry.raw_artist, &item.entry.raw_title);
            let ctx = EpisodeContext {
                episode_external_id: &item.episode.external_id,
                show_name: item.episode.show_name.as_deref(),
            };
            let resolution = self.matcher.resolve(&norm, ctx).await?;
            self.db
                .link_raw_entry(item.entry.id, resolution.canonical_id, resolution.status)?;
            if resolution.status.is_resolved() {
                resolved += 1;
                if !touched_episodes.contains(&item.episode.id) {
                    touched_episodes.push(item.episode.id);
                }
            }
        }

        for episode_id in touched_episodes {
            self.finalize_episode(episode_id)?;
        }

        log::info!("re-match pass resolved {resolved} entries");
        Ok(resolved)
    }
}
