//! The watch-progress store: which anime are on the user's list and which
//! episodes they opened.
//!
//! The in-memory collection is authoritative for the session. Every mutation
//! is written through to the [`Backend`] best-effort: a failed read or write is
//! logged, the store is flagged as degraded, and the session carries on.
//!
//! A list that could not be loaded is never overwritten implicitly. Until
//! [`ProgressStore::repair`] is called, mutations stay in memory only.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{Backend, MemoryBackend};
use crate::error::TsuzukiError;
use crate::models::AnimeProgressRecord;

/// Key the collection is stored under when none is configured.
pub const DEFAULT_NAMESPACE: &str = "web-state-persist";

/// Envelope version written to storage.
const BLOB_VERSION: u32 = 0;

/// Suffix of the key an unreadable blob is copied to by [`ProgressStore::repair`].
pub const BACKUP_SUFFIX: &str = ".corrupt";

/// Result of [`ProgressStore::add_to_list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new record was created.
    Added,
    /// The anime was already listed; title, image, and episode count were refreshed.
    Refreshed,
}

/// Result of [`ProgressStore::save_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// First time this episode was opened.
    Appended,
    /// Watched before; moved to the end as the new last-watched episode.
    Rewatched,
    /// Already the last-watched episode, nothing changed.
    AlreadyLast,
    /// The anime is not on the list, nothing was recorded.
    Untracked,
}

#[derive(Serialize, Deserialize)]
struct PersistedState {
    state: PersistedList,
    #[serde(default)]
    version: u32,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedList {
    #[serde(default)]
    anime_details: Vec<AnimeProgressRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredBlob {
    Envelope(PersistedState),
    Bare(Vec<AnimeProgressRecord>),
}

/// Parse a persisted blob. Accepts the versioned envelope or a bare array.
pub fn decode(blob: &str) -> Result<Vec<AnimeProgressRecord>, TsuzukiError> {
    let records = match serde_json::from_str::<StoredBlob>(blob)? {
        StoredBlob::Envelope(persisted) => {
            if persisted.version != BLOB_VERSION {
                warn!(
                    version = persisted.version,
                    "Unknown watch-list version, reading anyway"
                );
            }
            persisted.state.anime_details
        }
        StoredBlob::Bare(records) => records,
    };
    Ok(dedup_by_id(records))
}

/// Serialize records into the versioned envelope.
pub fn encode(records: &[AnimeProgressRecord]) -> Result<String, TsuzukiError> {
    let persisted = PersistedState {
        state: PersistedList {
            anime_details: records.to_vec(),
        },
        version: BLOB_VERSION,
    };
    Ok(serde_json::to_string(&persisted)?)
}

/// Keep the first record per anime id. Hand-edited or merged blobs may repeat ids.
fn dedup_by_id(records: Vec<AnimeProgressRecord>) -> Vec<AnimeProgressRecord> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.anime_id.clone()))
        .collect()
}

/// Owned, injectable watch-progress state.
pub struct ProgressStore {
    records: Vec<AnimeProgressRecord>,
    backend: Box<dyn Backend>,
    namespace: String,
    degraded: bool,
    /// Set when the stored list could not be loaded; writes are held back.
    load_failed: bool,
    /// Raw contents of a corrupt blob, kept for the backup written by `repair`.
    unreadable_blob: Option<String>,
}

impl std::fmt::Debug for ProgressStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStore")
            .field("backend", &self.backend.name())
            .field("namespace", &self.namespace)
            .field("records", &self.records.len())
            .field("degraded", &self.degraded)
            .field("load_failed", &self.load_failed)
            .finish()
    }
}

impl ProgressStore {
    /// Load the collection stored under `namespace`.
    ///
    /// Never fails: unreadable or corrupt storage yields an empty, degraded store
    /// that leaves the stored data alone.
    pub fn open(backend: Box<dyn Backend>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let mut load_failed = false;
        let mut unreadable_blob = None;

        let records = match backend.read(&namespace) {
            Ok(Some(blob)) => match decode(&blob) {
                Ok(records) => records,
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Corrupt watch list, starting empty");
                    load_failed = true;
                    unreadable_blob = Some(blob);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "Storage unavailable, using session-only list");
                load_failed = true;
                Vec::new()
            }
        };

        debug!(
            backend = backend.name(),
            namespace = %namespace,
            count = records.len(),
            "Loaded watch list"
        );

        Self {
            records,
            backend,
            namespace,
            degraded: load_failed,
            load_failed,
            unreadable_blob,
        }
    }

    /// Session-only store with nothing persisted.
    pub fn in_memory() -> Self {
        Self::from_records(Vec::new())
    }

    /// Session-only store seeded with `records`.
    pub fn from_records(records: Vec<AnimeProgressRecord>) -> Self {
        Self {
            records: dedup_by_id(records),
            backend: Box::new(MemoryBackend::new()),
            namespace: DEFAULT_NAMESPACE.to_string(),
            degraded: false,
            load_failed: false,
            unreadable_blob: None,
        }
    }

    // ── Mutations ───────────────────────────────────────────────

    /// Put an anime on the list. Re-adding refreshes its metadata and keeps its history.
    pub fn add_to_list(
        &mut self,
        id: &str,
        title: &str,
        image: &str,
        total_episodes: u32,
    ) -> AddOutcome {
        if let Some(record) = self.find_mut(id) {
            let changed = record.title != title
                || record.image != image
                || record.total_episodes != total_episodes;
            if changed {
                record.title = title.to_string();
                record.image = image.to_string();
                record.total_episodes = total_episodes;
                record.updated_at = Some(Utc::now());
                info!(id, title, "Refreshed list entry");
                self.persist();
            } else {
                debug!(id, "Already on list");
            }
            return AddOutcome::Refreshed;
        }

        self.records
            .push(AnimeProgressRecord::new(id, title, image, total_episodes));
        info!(id, title, "Added to list");
        self.persist();
        AddOutcome::Added
    }

    /// Take an anime off the list. Returns whether it was there.
    pub fn remove_from_list(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.anime_id != id);
        if self.records.len() == before {
            debug!(id, "Not on list, nothing to remove");
            return false;
        }
        info!(id, "Removed from list");
        self.persist();
        true
    }

    /// Record that `episode` of anime `id` was opened.
    pub fn save_data(&mut self, id: &str, episode: u32) -> WatchOutcome {
        let Some(record) = self.find_mut(id) else {
            debug!(id, episode, "Anime not on list, episode not recorded");
            return WatchOutcome::Untracked;
        };

        let outcome = match record.watched_episode.iter().position(|&e| e == episode) {
            Some(pos) if pos + 1 == record.watched_episode.len() => {
                debug!(id, episode, "Already last watched");
                return WatchOutcome::AlreadyLast;
            }
            Some(pos) => {
                record.watched_episode.remove(pos);
                record.watched_episode.push(episode);
                WatchOutcome::Rewatched
            }
            None => {
                record.watched_episode.push(episode);
                WatchOutcome::Appended
            }
        };
        record.updated_at = Some(Utc::now());
        info!(id, episode, ?outcome, "Recorded episode");
        self.persist();
        outcome
    }

    /// Drop every record.
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        if removed > 0 {
            self.records.clear();
            info!(removed, "Cleared list");
            self.persist();
        }
        removed
    }

    // ── Reads ───────────────────────────────────────────────────

    /// All records in insertion order.
    pub fn records(&self) -> &[AnimeProgressRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&AnimeProgressRecord> {
        self.records.iter().find(|r| r.anime_id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn is_watched(&self, id: &str, episode: u32) -> bool {
        self.get(id).is_some_and(|r| r.has_watched(episode))
    }

    pub fn last_watched(&self, id: &str) -> Option<u32> {
        self.get(id).and_then(AnimeProgressRecord::last_watched)
    }

    /// Up to `limit` records, most recently touched first.
    pub fn recent(&self, limit: usize) -> Vec<&AnimeProgressRecord> {
        let mut rows: Vec<&AnimeProgressRecord> = self.records.iter().collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        rows.truncate(limit);
        rows
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ── Persistence ─────────────────────────────────────────────

    /// True once a read or write against durable storage has failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// True when the stored list could not be loaded. Nothing is written until [`repair`](Self::repair).
    pub fn load_failed(&self) -> bool {
        self.load_failed
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Serialize the current collection.
    pub fn to_blob(&self) -> Result<String, TsuzukiError> {
        encode(&self.records)
    }

    /// Write the collection now, surfacing any error. Clears the degraded flag on success.
    ///
    /// Refuses with [`TsuzukiError::Unreadable`] while the stored list could not be loaded.
    pub fn flush(&mut self) -> Result<(), TsuzukiError> {
        if self.load_failed {
            return Err(TsuzukiError::Unreadable(format!(
                "`{}` in {} storage",
                self.namespace,
                self.backend.name()
            )));
        }
        let blob = self.to_blob()?;
        self.backend.write(&self.namespace, &blob)?;
        if self.degraded {
            info!(backend = self.backend.name(), "Storage recovered");
        }
        self.degraded = false;
        Ok(())
    }

    /// Take over storage after a failed load: copy a corrupt blob to
    /// `<namespace>.corrupt`, then write the session list in its place.
    ///
    /// Returns the backup key when one was written.
    pub fn repair(&mut self) -> Result<Option<String>, TsuzukiError> {
        let mut backup = None;
        if let Some(blob) = &self.unreadable_blob {
            let key = format!("{}{BACKUP_SUFFIX}", self.namespace);
            self.backend.write(&key, blob)?;
            warn!(backend = self.backend.name(), key = %key, "Backed up unreadable watch list");
            backup = Some(key);
        }
        self.load_failed = false;
        self.unreadable_blob = None;
        self.flush()?;
        Ok(backup)
    }

    fn persist(&mut self) {
        if self.load_failed {
            debug!(
                backend = self.backend.name(),
                "Stored list was unreadable, keeping changes in memory"
            );
            return;
        }
        if let Err(e) = self.flush() {
            warn!(
                backend = self.backend.name(),
                error = %e,
                "Failed to persist watch list, keeping session copy"
            );
            self.degraded = true;
        }
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut AnimeProgressRecord> {
        self.records.iter_mut().find(|r| r.anime_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileBackend;
    use chrono::TimeZone;

    fn file_store(dir: &std::path::Path) -> ProgressStore {
        let backend = FileBackend::open(dir).unwrap();
        ProgressStore::open(Box::new(backend), DEFAULT_NAMESPACE)
    }

    #[test]
    fn test_naruto_walkthrough() {
        let mut store = ProgressStore::in_memory();

        assert_eq!(store.add_to_list("1", "Naruto", "img.png", 220), AddOutcome::Added);
        let record = store.get("1").unwrap();
        assert_eq!(record.anime_id, "1");
        assert!(record.watched_episode.is_empty());

        assert_eq!(store.save_data("1", 5), WatchOutcome::Appended);
        assert_eq!(store.get("1").unwrap().watched_episode, vec![5]);

        assert_eq!(store.save_data("1", 5), WatchOutcome::AlreadyLast);
        assert_eq!(store.get("1").unwrap().watched_episode, vec![5]);

        assert!(store.remove_from_list("1"));
        assert!(!store.contains("1"));
    }

    #[test]
    fn test_duplicate_add_keeps_one_record() {
        let mut store = ProgressStore::in_memory();
        store.add_to_list("1", "Naruto", "img.png", 220);
        store.save_data("1", 3);

        assert_eq!(
            store.add_to_list("1", "Naruto Shippuden", "new.png", 500),
            AddOutcome::Refreshed
        );
        assert_eq!(store.len(), 1);

        let record = store.get("1").unwrap();
        assert_eq!(record.title, "Naruto Shippuden");
        assert_eq!(record.total_episodes, 500);
        assert_eq!(record.watched_episode, vec![3]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut store = ProgressStore::in_memory();
        store.add_to_list("1", "Naruto", "img.png", 220);

        assert!(!store.remove_from_list("404"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_rewatch_moves_to_end_without_duplicating() {
        let mut store = ProgressStore::in_memory();
        store.add_to_list("1", "Naruto", "img.png", 220);
        for ep in [1, 2, 3] {
            store.save_data("1", ep);
        }

        assert_eq!(store.save_data("1", 1), WatchOutcome::Rewatched);
        assert_eq!(store.get("1").unwrap().watched_episode, vec![2, 3, 1]);
        assert_eq!(store.last_watched("1"), Some(1));
    }

    #[test]
    fn test_last_watched_tracks_most_recent() {
        let mut store = ProgressStore::in_memory();
        store.add_to_list("1", "Naruto", "img.png", 220);

        for ep in [4, 9, 2, 9, 7] {
            store.save_data("1", ep);
            assert_eq!(store.last_watched("1"), Some(ep));
        }
        assert!(store.is_watched("1", 4));
        assert!(!store.is_watched("1", 5));
    }

    #[test]
    fn test_save_data_without_record_is_skipped() {
        let mut store = ProgressStore::in_memory();
        assert_eq!(store.save_data("1", 5), WatchOutcome::Untracked);
        assert!(store.is_empty());
        assert_eq!(store.last_watched("1"), None);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = file_store(dir.path());
            store.add_to_list("1", "Naruto", "img.png", 220);
            store.add_to_list("2", "Bleach", "bleach.png", 366);
            store.save_data("1", 5);
            store.remove_from_list("2");
        }

        let store = file_store(dir.path());
        assert!(!store.is_degraded());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("1").unwrap().watched_episode, vec![5]);
    }

    #[test]
    fn test_failed_writes_keep_session_state() {
        let backend = MemoryBackend::new().fail_writes(true);
        let mut store = ProgressStore::open(Box::new(backend), DEFAULT_NAMESPACE);
        assert!(!store.is_degraded());

        store.add_to_list("1", "Naruto", "img.png", 220);
        store.save_data("1", 1);

        assert!(store.is_degraded());
        assert_eq!(store.last_watched("1"), Some(1));
        assert!(store.flush().is_err());
    }

    #[test]
    fn test_flush_recovers_after_storage_returns() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let mut store = file_store(&data);

        std::fs::remove_dir_all(&data).unwrap();
        store.add_to_list("1", "Naruto", "img.png", 220);
        assert!(store.is_degraded());

        std::fs::create_dir_all(&data).unwrap();
        store.flush().unwrap();
        assert!(!store.is_degraded());
        assert_eq!(file_store(&data).len(), 1);
    }

    #[test]
    fn test_corrupt_blob_degrades_to_empty() {
        let backend = MemoryBackend::new().with_entry(DEFAULT_NAMESPACE, "{not json");
        let store = ProgressStore::open(Box::new(backend), DEFAULT_NAMESPACE);
        assert!(store.is_degraded());
        assert!(store.load_failed());
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_file_blob_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{DEFAULT_NAMESPACE}.json"));
        let truncated = r#"{"state":{"animeDetails":[{"animeId":"1","title":"Nar"#;
        std::fs::write(&path, truncated).unwrap();

        let mut store = file_store(dir.path());
        store.add_to_list("2", "Bleach", "", 366);
        store.save_data("2", 1);
        store.remove_from_list("2");
        store.add_to_list("3", "Mushishi", "", 26);

        assert!(store.is_degraded());
        assert_eq!(store.len(), 1);
        assert!(matches!(store.flush(), Err(TsuzukiError::Unreadable(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), truncated);
    }

    #[test]
    fn test_repair_backs_up_corrupt_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{DEFAULT_NAMESPACE}.json"));
        std::fs::write(&path, "{not json").unwrap();

        let mut store = file_store(dir.path());
        store.add_to_list("1", "Naruto", "", 220);
        let backup = store.repair().unwrap();

        assert_eq!(backup.as_deref(), Some("web-state-persist.corrupt"));
        assert!(!store.is_degraded() && !store.load_failed());
        let saved = dir.path().join("web-state-persist.corrupt.json");
        assert_eq!(std::fs::read_to_string(saved).unwrap(), "{not json");
        assert!(file_store(dir.path()).contains("1"));
    }

    #[test]
    fn test_failed_read_opens_empty_and_degraded() {
        let backend = MemoryBackend::new()
            .with_entry(DEFAULT_NAMESPACE, "[]")
            .fail_reads(true);
        let mut store = ProgressStore::open(Box::new(backend), DEFAULT_NAMESPACE);
        assert!(store.is_empty());
        assert!(store.is_degraded() && store.load_failed());

        store.add_to_list("1", "Naruto", "", 220);
        store.save_data("1", 1);
        assert_eq!(store.last_watched("1"), Some(1));
        // A successful write would have cleared the flag.
        assert!(store.is_degraded());
        assert!(matches!(store.flush(), Err(TsuzukiError::Unreadable(_))));
    }

    #[test]
    fn test_unreadable_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{DEFAULT_NAMESPACE}.json"));
        let bytes = [0xff, 0xfe, b'[', b']'];
        std::fs::write(&path, bytes).unwrap();

        let mut store = file_store(dir.path());
        assert!(store.load_failed());
        store.add_to_list("1", "Naruto", "", 220);
        store.clear();

        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn test_decode_envelope_and_bare_array() {
        let envelope = r#"{"state":{"animeDetails":[
            {"animeId":"1","title":"Naruto","image":"img.png","totalEpisodes":220,"watchedEpisode":[1,2]}
        ]},"version":0}"#;
        let records = decode(envelope).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].last_watched(), Some(2));

        let bare = r#"[{"animeId":"1","title":"Naruto","image":"","totalEpisodes":220,"watchedEpisode":[]},
                       {"animeId":"1","title":"Dup","image":"","totalEpisodes":1,"watchedEpisode":[]}]"#;
        let records = decode(bare).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Naruto");
    }

    #[test]
    fn test_encode_writes_envelope() {
        let mut store = ProgressStore::in_memory();
        store.add_to_list("1", "Naruto", "img.png", 220);

        let value: serde_json::Value = serde_json::from_str(&store.to_blob().unwrap()).unwrap();
        assert_eq!(value["version"], 0);
        assert_eq!(value["state"]["animeDetails"][0]["animeId"], "1");
    }

    #[test]
    fn test_recent_orders_by_last_touch() {
        let at = |hour: u32| Some(Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap());
        let mut naruto = AnimeProgressRecord::new("1", "Naruto", "", 220);
        naruto.updated_at = at(8);
        let mut bleach = AnimeProgressRecord::new("2", "Bleach", "", 366);
        bleach.updated_at = at(10);
        let mut one_piece = AnimeProgressRecord::new("3", "One Piece", "", 1100);
        one_piece.updated_at = at(9);
        let mut untouched = AnimeProgressRecord::new("4", "Mushishi", "", 26);
        untouched.updated_at = None;

        let mut store = ProgressStore::from_records(vec![naruto, bleach, one_piece, untouched]);
        let ids = |store: &ProgressStore, limit| -> Vec<String> {
            store.recent(limit).iter().map(|r| r.anime_id.clone()).collect()
        };
        assert_eq!(ids(&store, 2), vec!["2", "3"]);

        // Watching stamps the record with the current time, later than any fixed one.
        store.save_data("1", 1);
        assert_eq!(ids(&store, 3), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_clear() {
        let mut store = ProgressStore::in_memory();
        assert_eq!(store.clear(), 0);
        store.add_to_list("1", "Naruto", "", 220);
        store.add_to_list("2", "Bleach", "", 366);
        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
    }
}
