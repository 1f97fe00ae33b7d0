pub mod models;

#[cfg(test)]
mod tests;

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub use models::*;

/// The track store. The only shared mutable resource in the core: all
/// mutations go through its upsert operations, which are safe under
/// concurrent invocation (the connection is serialized, and identity races
/// resolve through uniqueness constraints rather than application locks).
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA cache_size=10000;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
        ",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            -- Mirrors the original pipeline's episodes table, plus the
            -- ingestion status column.
            CREATE TABLE IF NOT EXISTS episodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL UNIQUE,
                channel TEXT,
                show_name TEXT,
                episode_title TEXT,
                broadcast_at TEXT,
                ingested_at TEXT NOT NULL DEFAULT (datetime('now')),
                status TEXT NOT NULL DEFAULT 'fetched'
            );

            CREATE INDEX IF NOT EXISTS idx_episodes_status ON episodes(status);

            -- One row per scraped playlist line. Never deduplicated across
            -- episodes; idempotent re-ingestion keys on (episode, position).
            CREATE TABLE IF NOT EXISTS raw_track_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                episode_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                raw_artist TEXT NOT NULL,
                raw_title TEXT NOT NULL,
                artist_key TEXT,
                title_key TEXT,
                canonical_track_id INTEGER,
                resolution_status TEXT NOT NULL DEFAULT 'pending',
                FOREIGN KEY (episode_id) REFERENCES episodes(id) ON DELETE CASCADE,
                FOREIGN KEY (canonical_track_id) REFERENCES canonical_tracks(id),
                UNIQUE(episode_id, position)
            );

            CREATE INDEX IF NOT EXISTS idx_raw_entries_episode ON raw_track_entries(episode_id);
            CREATE INDEX IF NOT EXISTS idx_raw_entries_status ON raw_track_entries(resolution_status);
            CREATE INDEX IF NOT EXISTS idx_raw_entries_canonical ON raw_track_entries(canonical_track_id);

            -- Deduplicated track identities. external_id is the catalog's
            -- identifier; UNIQUE allows multiple NULLs for catalog-less rows.
            CREATE TABLE IF NOT EXISTS canonical_tracks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                artist_key TEXT NOT NULL,
                title_key TEXT NOT NULL,
                display_artist TEXT NOT NULL,
                display_title TEXT NOT NULL,
                external_id TEXT UNIQUE,
                popularity INTEGER,
                audio_features_json TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_canonical_key ON canonical_tracks(artist_key, title_key);
        "#,
        )?;

        Ok(())
    }

    // =========================================================================
    // Episodes
    // =========================================================================

    /// Idempotent episode upsert keyed on the external broadcast identifier.
    /// Re-ingestion overwrites episode-only fields; the row identity and any
    /// attached raw entries are untouched. Returns `(id, created)`.
    pub fn upsert_episode(
        &self,
        external_id: &str,
        channel: Option<&str>,
        show_name: Option<&str>,
        episode_title: Option<&str>,
        broadcast_at: Option<&str>,
    ) -> Result<(i64, bool)> {
        let conn = self.conn.lock().unwrap();

        let existing_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM episodes WHERE external_id = ?",
                params![external_id],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing_id {
            conn.execute(
                "UPDATE episodes SET
                    channel = COALESCE(?, channel),
                    show_name = COALESCE(?, show_name),
                    episode_title = COALESCE(?, episode_title),
                    broadcast_at = COALESCE(?, broadcast_at)
                 WHERE id = ?",
                params![channel, show_name, episode_title, broadcast_at, id],
            )?;
            Ok((id, false))
        } else {
            let now = chrono::Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO episodes (external_id, channel, show_name, episode_title, broadcast_at, ingested_at, status)
                 VALUES (?, ?, ?, ?, ?, ?, 'fetched')",
                params![external_id, channel, show_name, episode_title, broadcast_at, now],
            )?;
            Ok((conn.last_insert_rowid(), true))
        }
    }

    pub fn get_episode_by_external_id(&self, external_id: &str) -> Result<Option<Episode>> {
        let conn = self.conn.lock().unwrap();
        let episode = conn
            .query_row(
                "SELECT id, external_id, channel, show_name, episode_title, broadcast_at, ingested_at, status
                 FROM episodes WHERE external_id = ?",
                params![external_id],
                Self::row_to_episode,
            )
            .optional()?;
        Ok(episode)
    }

    pub fn set_episode_status(&self, episode_id: i64, status: EpisodeStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE episodes SET status = ? WHERE id = ?",
            params![status.to_string(), episode_id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Raw track entries
    // =========================================================================

    /// Idempotent raw-entry upsert keyed on `(episode_id, position)`.
    /// Re-applying with identical input is a no-op; an existing canonical
    /// link and resolution status are preserved.
    pub fn upsert_raw_entry(
        &self,
        episode_id: i64,
        position: i64,
        raw_artist: &str,
        raw_title: &str,
        artist_key: Option<&str>,
        title_key: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let id: i64 = conn.query_row(
            "INSERT INTO raw_track_entries (episode_id, position, raw_artist, raw_title, artist_key, title_key)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(episode_id, position) DO UPDATE SET
                raw_artist = excluded.raw_artist,
                raw_title = excluded.raw_title,
                artist_key = excluded.artist_key,
                title_key = excluded.title_key
             RETURNING id",
            params![episode_id, position, raw_artist, raw_title, artist_key, title_key],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Record an entry's resolution. `canonical_id = None` clears the link
    /// (used when a forced re-ingest downgrades a previously resolved entry).
    pub fn link_raw_entry(
        &self,
        raw_entry_id: i64,
        canonical_id: Option<i64>,
        status: ResolutionStatus,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE raw_track_entries SET canonical_track_id = ?, resolution_status = ? WHERE id = ?",
            params![canonical_id, status.to_string(), raw_entry_id],
        )?;
        Ok(())
    }

    pub fn get_raw_entries(&self, episode_id: i64) -> Result<Vec<RawTrackEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, episode_id, position, raw_artist, raw_title, artist_key, title_key,
                    canonical_track_id, resolution_status
             FROM raw_track_entries WHERE episode_id = ? ORDER BY position",
        )?;
        let entries = stmt
            .query_map(params![episode_id], Self::row_to_raw_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Entries flagged for a later re-match pass, oldest episodes first,
    /// joined with their episode for matcher context.
    pub fn unresolved_entries(&self, limit: i64) -> Result<Vec<UnresolvedEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.episode_id, r.position, r.raw_artist, r.raw_title, r.artist_key,
                    r.title_key, r.canonical_track_id, r.resolution_status,
                    e.id, e.external_id, e.channel, e.show_name, e.episode_title, e.broadcast_at,
                    e.ingested_at, e.status
             FROM raw_track_entries r
             JOIN episodes e ON r.episode_id = e.id
             WHERE r.resolution_status IN
                ('unresolved_no_match', 'unresolved_ambiguous', 'unresolved_catalog_unavailable')
             ORDER BY e.id, r.position
             LIMIT ?",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(UnresolvedEntry {
                    entry: RawTrackEntry {
                        id: row.get(0)?,
                        episode_id: row.get(1)?,
                        position: row.get(2)?,
                        raw_artist: row.get(3)?,
                        raw_title: row.get(4)?,
                        artist_key: row.get(5)?,
                        title_key: row.get(6)?,
                        canonical_track_id: row.get(7)?,
                        resolution_status: ResolutionStatus::from(row.get::<_, String>(8)?),
                    },
                    episode: Episode {
                        id: row.get(9)?,
                        external_id: row.get(10)?,
                        channel: row.get(11)?,
                        show_name: row.get(12)?,
                        episode_title: row.get(13)?,
                        broadcast_at: row.get(14)?,
                        ingested_at: row.get(15)?,
                        status: EpisodeStatus::from(row.get::<_, String>(16)?),
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // =========================================================================
    // Canonical tracks
    // =========================================================================

    /// Idempotent canonical-track upsert.
    ///
    /// With an external id, identity creation is first-writer-wins through
    /// the UNIQUE constraint: a concurrent loser lands on the conflict arm,
    /// updates only non-identity fields (last-writer-wins), and adopts the
    /// winner's row id. Without an external id the row is keyed on the
    /// normalized pair.
    pub fn upsert_canonical_track(&self, new: &NewCanonicalTrack) -> Result<i64> {
        let conn = self.conn.lock().unwrap();

        if let Some(external_id) = new.external_id.as_deref() {
            let now = chrono::Utc::now().to_rfc3339();
            let id: i64 = conn.query_row(
                "INSERT INTO canonical_tracks
                    (artist_key, title_key, display_artist, display_title, external_id, popularity, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(external_id) DO UPDATE SET
                    display_artist = excluded.display_artist,
                    display_title = excluded.display_title,
                    popularity = excluded.popularity
                 RETURNING id",
                params![
                    new.artist_key,
                    new.title_key,
                    new.display_artist,
                    new.display_title,
                    external_id,
                    new.popularity,
                    now
                ],
                |row| row.get(0),
            )?;
            return Ok(id);
        }

        // No catalog identity: key on the normalized pair.
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM canonical_tracks WHERE artist_key = ? AND title_key = ? AND external_id IS NULL",
                params![new.artist_key, new.title_key],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO canonical_tracks
                (artist_key, title_key, display_artist, display_title, external_id, popularity, created_at)
             VALUES (?, ?, ?, ?, NULL, ?, ?)",
            params![
                new.artist_key,
                new.title_key,
                new.display_artist,
                new.display_title,
                new.popularity,
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_canonical_by_external_id(&self, external_id: &str) -> Result<Option<CanonicalTrack>> {
        let conn = self.conn.lock().unwrap();
        let track = conn
            .query_row(
                "SELECT id, artist_key, title_key, display_artist, display_title, external_id,
                        popularity, audio_features_json, created_at
                 FROM canonical_tracks WHERE external_id = ?",
                params![external_id],
                Self::row_to_canonical,
            )
            .optional()?;
        Ok(track)
    }

    /// Exact normalized-key lookup. Oldest row wins when several canonical
    /// tracks share a key (distinct catalog entities can normalize alike).
    pub fn find_canonical_by_key(
        &self,
        artist_key: &str,
        title_key: &str,
    ) -> Result<Option<CanonicalTrack>> {
        let conn = self.conn.lock().unwrap();
        let track = conn
            .query_row(
                "SELECT id, artist_key, title_key, display_artist, display_title, external_id,
                        popularity, audio_features_json, created_at
                 FROM canonical_tracks WHERE artist_key = ? AND title_key = ?
                 ORDER BY id LIMIT 1",
                params![artist_key, title_key],
                Self::row_to_canonical,
            )
            .optional()?;
        Ok(track)
    }

    pub fn count_canonical_tracks(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row("SELECT COUNT(*) FROM canonical_tracks", [], |row| row.get(0))?;
        Ok(count)
    }

    // =========================================================================
    // Output boundary
    // =========================================================================

    /// The per-episode result consumed by the analytics layer.
    pub fn episode_outcome(&self, episode_id: i64) -> Result<EpisodeOutcome> {
        let conn = self.conn.lock().unwrap();

        let (external_id, status): (String, String) = conn.query_row(
            "SELECT external_id, status FROM episodes WHERE id = ?",
            params![episode_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT position, canonical_track_id, resolution_status
             FROM raw_track_entries WHERE episode_id = ? ORDER BY position",
        )?;
        let entries = stmt
            .query_map(params![episode_id], |row| {
                Ok(ResolvedEntry {
                    position: row.get(0)?,
                    canonical_track_id: row.get(1)?,
                    resolution_status: ResolutionStatus::from(row.get::<_, String>(2)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(EpisodeOutcome {
            episode_id,
            external_id,
            status: EpisodeStatus::from(status),
            entries,
        })
    }

    // =========================================================================
    // Row mappers
    // =========================================================================

    fn row_to_episode(row: &rusqlite::Row<'_>) -> rusqlite::Result<Episode> {
        Ok(Episode {
            id: row.get(0)?,
            external_id: row.get(1)?,
            channel: row.get(2)?,
            show_name: row.get(3)?,
            episode_title: row.get(4)?,
            broadcast_at: row.get(5)?,
            ingested_at: row.get(6)?,
            status: EpisodeStatus::from(row.get::<_, String>(7)?),
        })
    }

    fn row_to_raw_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTrackEntry> {
        Ok(RawTrackEntry {
            id: row.get(0)?,
            episode_id: row.get(1)?,
            position: row.get(2)?,
            raw_artist: row.get(3)?,
            raw_title: row.get(4)?,
            artist_key: row.get(5)?,
            title_key: row.get(6)?,
            canonical_track_id: row.get(7)?,
            resolution_status: ResolutionStatus::from(row.get::<_, String>(8)?),
        })
    }

    fn row_to_canonical(row: &rusqlite::Row<'_>) -> rusqlite::Result<CanonicalTrack> {
        Ok(CanonicalTrack {
            id: row.get(0)?,
            artist_key: row.get(1)?,
            title_key: row.get(2)?,
            display_artist: row.get(3)?,
            display_title: row.get(4)?,
            external_id: row.get(5)?,
            popularity: row.get(6)?,
            audio_features_json: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

/// An unresolved raw entry joined with its episode, for the re-match pass.
#[derive(Debug, Clone)]
pub struct UnresolvedEntry {
    pub entry: RawTrackEntry,
    pub episode: Episode,
}
