// Edge-case tests for the track store: idempotent upserts, uniqueness
// invariants, and the output-boundary queries.
// Run with: cargo test --package setscraper-core --lib database::tests

#[cfg(test)]
mod episode_tests {
    use crate::database::{Database, EpisodeStatus};
    use tempfile::TempDir;

    fn setup_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&db_path).unwrap();
        (db, temp_dir)
    }

    #[test]
    fn test_upsert_episode_basic() {
        let (db, _temp) = setup_test_db();
        let (id, created) = db
            .upsert_episode(
                "m002845d",
                Some("BBC 6 Music"),
                Some("Four Tet Mix"),
                Some("Late Night Session"),
                Some("2026-05-01T22:00:00Z"),
            )
            .unwrap();
        assert!(id > 0);
        assert!(created);

        let episode = db.get_episode_by_external_id("m002845d").unwrap().unwrap();
        assert_eq!(episode.channel.as_deref(), Some("BBC 6 Music"));
        assert_eq!(episode.status, EpisodeStatus::Fetched);
    }

    #[test]
    fn test_upsert_episode_is_idempotent() {
        let (db, _temp) = setup_test_db();
        let (first_id, created) = db
            .upsert_episode("m002845d", Some("BBC 6 Music"), None, None, None)
            .unwrap();
        assert!(created);

        let (second_id, created) = db
            .upsert_episode("m002845d", Some("BBC 6 Music"), None, None, None)
            .unwrap();
        assert!(!created);
        assert_eq!(first_id, second_id);
    }

    #[test]
    fn test_reingest_overwrites_episode_fields_only() {
        let (db, _temp) = setup_test_db();
        let (id, _) = db
            .upsert_episode("m002845d", Some("BBC 6 Music"), None, Some("Old Title"), None)
            .unwrap();
        db.set_episode_status(id, EpisodeStatus::Committed).unwrap();

        db.upsert_episode("m002845d", None, Some("Four Tet Mix"), Some("New Title"), None)
            .unwrap();

        let episode = db.get_episode_by_external_id("m002845d").unwrap().unwrap();
        // Updated where provided, kept where absent, status untouched.
        assert_eq!(episode.episode_title.as_deref(), Some("New Title"));
        assert_eq!(episode.channel.as_deref(), Some("BBC 6 Music"));
        assert_eq!(episode.show_name.as_deref(), Some("Four Tet Mix"));
        assert_eq!(episode.status, EpisodeStatus::Committed);
    }

    #[test]
    fn test_missing_episode_is_none() {
        let (db, _temp) = setup_test_db();
        assert!(db.get_episode_by_external_id("m002zzzz").unwrap().is_none());
    }
}

#[cfg(test)]
mod raw_entry_tests {
    use crate::database::{Database, ResolutionStatus};
    use tempfile::TempDir;

    fn setup_db_with_episode() -> (Database, TempDir, i64) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let (episode_id, _) = db
            .upsert_episode("m002845d", Some("BBC 6 Music"), None, None, None)
            .unwrap();
        (db, temp_dir, episode_id)
    }

    #[test]
    fn test_upsert_raw_entry_keyed_on_position() {
        let (db, _temp, episode_id) = setup_db_with_episode();
        let first = db
            .upsert_raw_entry(episode_id, 0, "Four Tet", "Baby", Some("four tet"), Some("baby"))
            .unwrap();
        let second = db
            .upsert_raw_entry(episode_id, 0, "Four Tet", "Baby", Some("four tet"), Some("baby"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(db.get_raw_entries(episode_id).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_preserves_existing_resolution() {
        let (db, _temp, episode_id) = setup_db_with_episode();
        let raw_id = db
            .upsert_raw_entry(episode_id, 0, "Four Tet", "Baby", Some("four tet"), Some("baby"))
            .unwrap();
        let canonical_id = db
            .upsert_canonical_track(&crate::database::NewCanonicalTrack {
                artist_key: "four tet".into(),
                title_key: "baby".into(),
                display_artist: "Four Tet".into(),
                display_title: "Baby".into(),
                external_id: Some("cat:1".into()),
                popularity: None,
            })
            .unwrap();
        db.link_raw_entry(raw_id, Some(canonical_id), ResolutionStatus::ResolvedCatalog)
            .unwrap();

        // Re-ingesting the same line must not clear the link.
        db.upsert_raw_entry(episode_id, 0, "Four Tet", "Baby", Some("four tet"), Some("baby"))
            .unwrap();
        let entry = &db.get_raw_entries(episode_id).unwrap()[0];
        assert_eq!(entry.canonical_track_id, Some(canonical_id));
        assert_eq!(entry.resolution_status, ResolutionStatus::ResolvedCatalog);
    }

    #[test]
    fn test_same_song_in_two_episodes_is_two_rows() {
        let (db, _temp, episode_id) = setup_db_with_episode();
        let (other_episode, _) = db
            .upsert_episode("m002846f", Some("BBC 6 Music"), None, None, None)
            .unwrap();

        db.upsert_raw_entry(episode_id, 0, "Four Tet", "Baby", Some("four tet"), Some("baby"))
            .unwrap();
        db.upsert_raw_entry(other_episode, 0, "Four Tet", "Baby", Some("four tet"), Some("baby"))
            .unwrap();

        assert_eq!(db.get_raw_entries(episode_id).unwrap().len(), 1);
        assert_eq!(db.get_raw_entries(other_episode).unwrap().len(), 1);
    }

    #[test]
    fn test_entries_ordered_by_position() {
        let (db, _temp, episode_id) = setup_db_with_episode();
        db.upsert_raw_entry(episode_id, 2, "C", "Three", Some("c"), Some("three"))
            .unwrap();
        db.upsert_raw_entry(episode_id, 0, "A", "One", Some("a"), Some("one"))
            .unwrap();
        db.upsert_raw_entry(episode_id, 1, "B", "Two", Some("b"), Some("two"))
            .unwrap();

        let positions: Vec<i64> = db
            .get_raw_entries(episode_id)
            .unwrap()
            .iter()
            .map(|e| e.position)
            .collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_unresolved_entries_join_episode() {
        let (db, _temp, episode_id) = setup_db_with_episode();
        let raw_id = db
            .upsert_raw_entry(episode_id, 0, "Four Tet", "Baby", Some("four tet"), Some("baby"))
            .unwrap();
        db.link_raw_entry(raw_id, None, ResolutionStatus::UnresolvedCatalogUnavailable)
            .unwrap();
        // Malformed entries are not retryable and must not be picked up.
        let malformed_id = db
            .upsert_raw_entry(episode_id, 1, "", "", None, None)
            .unwrap();
        db.link_raw_entry(malformed_id, None, ResolutionStatus::UnresolvedMalformed)
            .unwrap();

        let batch = db.unresolved_entries(10).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].entry.id, raw_id);
        assert_eq!(batch[0].episode.external_id, "m002845d");
    }
}

#[cfg(test)]
mod canonical_tests {
    use crate::database::{Database, NewCanonicalTrack};
    use tempfile::TempDir;

    fn setup_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        (db, temp_dir)
    }

    fn new_track(external_id: Option<&str>, popularity: Option<i64>) -> NewCanonicalTrack {
        NewCanonicalTrack {
            artist_key: "four tet".into(),
            title_key: "baby".into(),
            display_artist: "Four Tet".into(),
            display_title: "Baby".into(),
            external_id: external_id.map(String::from),
            popularity,
        }
    }

    #[test]
    fn test_upsert_is_idempotent_on_external_id() {
        let (db, _temp) = setup_test_db();
        let first = db.upsert_canonical_track(&new_track(Some("cat:1"), Some(61))).unwrap();
        let second = db.upsert_canonical_track(&new_track(Some("cat:1"), Some(61))).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.count_canonical_tracks().unwrap(), 1);
    }

    #[test]
    fn test_conflict_updates_non_identity_fields_only() {
        let (db, _temp) = setup_test_db();
        let id = db.upsert_canonical_track(&new_track(Some("cat:1"), Some(10))).unwrap();

        // Second writer with the same external id: adopts the winner's row,
        // refreshes popularity, but never rewrites the identity keys.
        let mut loser = new_track(Some("cat:1"), Some(99));
        loser.artist_key = "someone else".into();
        let adopted = db.upsert_canonical_track(&loser).unwrap();
        assert_eq!(adopted, id);

        let track = db.find_canonical_by_external_id("cat:1").unwrap().unwrap();
        assert_eq!(track.popularity, Some(99));
        assert_eq!(track.artist_key, "four tet");
        assert_eq!(db.count_canonical_tracks().unwrap(), 1);
    }

    #[test]
    fn test_upsert_without_external_id_keys_on_normalized_pair() {
        let (db, _temp) = setup_test_db();
        let first = db.upsert_canonical_track(&new_track(None, None)).unwrap();
        let second = db.upsert_canonical_track(&new_track(None, None)).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.count_canonical_tracks().unwrap(), 1);
    }

    #[test]
    fn test_multiple_null_external_ids_allowed() {
        let (db, _temp) = setup_test_db();
        db.upsert_canonical_track(&new_track(None, None)).unwrap();
        let mut other = new_track(None, None);
        other.artist_key = "caribou".into();
        other.title_key = "odessa".into();
        db.upsert_canonical_track(&other).unwrap();
        assert_eq!(db.count_canonical_tracks().unwrap(), 2);
    }

    #[test]
    fn test_find_by_key() {
        let (db, _temp) = setup_test_db();
        let id = db.upsert_canonical_track(&new_track(Some("cat:1"), None)).unwrap();
        let found = db.find_canonical_by_key("four tet", "baby").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(db.find_canonical_by_key("four tet", "nothing").unwrap().is_none());
    }

    #[test]
    fn test_audio_features_placeholder_starts_empty() {
        let (db, _temp) = setup_test_db();
        db.upsert_canonical_track(&new_track(Some("cat:1"), None)).unwrap();
        let track = db.find_canonical_by_external_id("cat:1").unwrap().unwrap();
        assert!(track.audio_features_json.is_none());
    }
}

#[cfg(test)]
mod outcome_tests {
    use crate::database::{Database, EpisodeStatus, ResolutionStatus};
    use tempfile::TempDir;

    #[test]
    fn test_episode_outcome_lists_entries_in_position_order() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let (episode_id, _) = db
            .upsert_episode("m002845d", Some("BBC 6 Music"), None, None, None)
            .unwrap();

        let a = db
            .upsert_raw_entry(episode_id, 1, "B", "Two", Some("b"), Some("two"))
            .unwrap();
        let b = db
            .upsert_raw_entry(episode_id, 0, "A", "One", Some("a"), Some("one"))
            .unwrap();
        db.link_raw_entry(a, None, ResolutionStatus::UnresolvedNoMatch)
            .unwrap();
        db.link_raw_entry(b, None, ResolutionStatus::UnresolvedAmbiguous)
            .unwrap();
        db.set_episode_status(episode_id, EpisodeStatus::PartiallyResolved)
            .unwrap();

        let outcome = db.episode_outcome(episode_id).unwrap();
        assert_eq!(outcome.external_id, "m002845d");
        assert_eq!(outcome.status, EpisodeStatus::PartiallyResolved);
        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.entries[0].position, 0);
        assert_eq!(
            outcome.entries[0].resolution_status,
            ResolutionStatus::UnresolvedAmbiguous
        );
        assert_eq!(outcome.entries[1].position, 1);
    }
}
