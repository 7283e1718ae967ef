//! Saved canvases, kept as one JSON blob keyed by canvas id.
//!
//! ```json
//! {
//!   "canvas-1": {"state": {...}, "name": "Untitled Canvas", "createdAt": "...", "updatedAt": "..."}
//! }
//! ```
//!
//! A missing or corrupt blob never fails the caller: the store logs it and starts empty, and
//! lookups of unknown ids fall back to [`CanvasState::initial`]. Editors save on every
//! keystroke, so [`DebouncedSaver`] coalesces bursts into one write.

use crate::leancanvas::canvas::CanvasState;
use crate::leancanvas::memory::{write_atomically, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

pub const DEFAULT_CANVAS_NAME: &str = "Untitled Canvas";
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasRecord {
    pub state: CanvasState,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing entry for the saved-canvases view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSummary {
    pub id: String,
    pub name: String,
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CanvasStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, CanvasRecord>>,
}

impl CanvasStore {
    /// Load the blob at `path`. Unreadable or corrupt blobs yield an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, CanvasRecord>>(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    log::warn!(
                        "canvas_store: {} is corrupt, starting empty: {}",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                log::warn!("canvas_store: could not read {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        log::info!(
            "canvas_store: {} canvas(es) loaded from {}",
            records.len(),
            path.display()
        );
        Self {
            path,
            records: RwLock::new(records),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &BTreeMap<String, CanvasRecord>) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(records)?;
        write_atomically(&self.path, &bytes).await
    }

    pub async fn get(&self, id: &str) -> Option<CanvasRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// Stored state of `id`, or the initial canvas when there is none.
    pub async fn state_or_initial(&self, id: &str) -> CanvasState {
        self.get(id)
            .await
            .map(|record| record.state)
            .unwrap_or_else(CanvasState::initial)
    }

    /// Store `state` under `id`, keeping the existing name and creation time.
    ///
    /// Memory only changes once the file has been written.
    pub async fn save(&self, id: &str, state: CanvasState) -> Result<CanvasRecord, StorageError> {
        let mut records = self.records.write().await;
        let now = Utc::now();
        let record = match records.get(id) {
            Some(existing) => CanvasRecord {
                state,
                name: existing.name.clone(),
                created_at: existing.created_at,
                updated_at: now,
            },
            None => CanvasRecord {
                state,
                name: DEFAULT_CANVAS_NAME.to_string(),
                created_at: now,
                updated_at: now,
            },
        };
        let mut next = records.clone();
        next.insert(id.to_string(), record.clone());
        self.persist(&next).await?;
        *records = next;
        log::debug!("canvas_store: saved {}", id);
        Ok(record)
    }

    /// Returns `false` when `id` is unknown.
    pub async fn rename(&self, id: &str, name: &str) -> Result<bool, StorageError> {
        let mut records = self.records.write().await;
        if !records.contains_key(id) {
            return Ok(false);
        }
        let mut next = records.clone();
        if let Some(record) = next.get_mut(id) {
            record.name = name.trim().to_string();
            record.updated_at = Utc::now();
        }
        self.persist(&next).await?;
        *records = next;
        Ok(true)
    }

    /// Returns `false` when `id` is unknown.
    pub async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let mut records = self.records.write().await;
        if !records.contains_key(id) {
            return Ok(false);
        }
        let mut next = records.clone();
        next.remove(id);
        self.persist(&next).await?;
        *records = next;
        Ok(true)
    }

    /// All canvases, most recently updated first.
    pub async fn list(&self) -> Vec<CanvasSummary> {
        let records = self.records.read().await;
        let mut summaries: Vec<CanvasSummary> = records
            .iter()
            .map(|(id, record)| CanvasSummary {
                id: id.clone(),
                name: record.name.clone(),
                item_count: record.state.item_count(),
                created_at: record.created_at,
                updated_at: record.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }
}

#[derive(Debug, Default)]
struct PendingSaves {
    generation: u64,
    states: HashMap<String, (u64, CanvasState)>,
}

/// Coalesces saves per canvas id: only the last state scheduled within `delay` is written.
#[derive(Debug, Clone)]
pub struct DebouncedSaver {
    store: Arc<CanvasStore>,
    delay: Duration,
    pending: Arc<Mutex<PendingSaves>>,
}

impl DebouncedSaver {
    pub fn new(store: Arc<CanvasStore>, delay: Duration) -> Self {
        Self {
            store,
            delay,
            pending: Arc::new(Mutex::new(PendingSaves::default())),
        }
    }

    pub fn store(&self) -> &Arc<CanvasStore> {
        &self.store
    }

    /// Schedule a save of `state`; supersedes any save of `id` still waiting.
    pub async fn schedule(&self, id: &str, state: CanvasState) {
        let generation = {
            let mut pending = self.pending.lock().await;
            pending.generation += 1;
            let generation = pending.generation;
            pending.states.insert(id.to_string(), (generation, state));
            generation
        };

        let saver = self.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(saver.delay).await;
            let state = {
                let mut pending = saver.pending.lock().await;
                match pending.states.get(&id) {
                    Some((scheduled, _)) if *scheduled == generation => {
                        pending.states.remove(&id).map(|(_, state)| state)
                    }
                    _ => None,
                }
            };
            if let Some(state) = state {
                if let Err(e) = saver.store.save(&id, state).await {
                    log::error!("canvas_store: debounced save of {} failed: {}", id, e);
                }
            }
        });
    }

    /// Write every pending state now, returning how many were saved.
    ///
    /// A state that fails to save goes back into the queue unless a newer one was scheduled
    /// meanwhile; the first error is returned after every state has been tried.
    pub async fn flush(&self) -> Result<usize, StorageError> {
        let drained: Vec<(String, u64, CanvasState)> = {
            let mut pending = self.pending.lock().await;
            pending
                .states
                .drain()
                .map(|(id, (generation, state))| (id, generation, state))
                .collect()
        };

        let mut saved = 0;
        let mut first_error = None;
        for (id, generation, state) in drained {
            match self.store.save(&id, state.clone()).await {
                Ok(_) => saved += 1,
                Err(e) => {
                    log::error!("canvas_store: flush of {} failed: {}", id, e);
                    self.pending
                        .lock()
                        .await
                        .states
                        .entry(id)
                        .or_insert((generation, state));
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leancanvas::mutation;

    #[tokio::test]
    async fn corrupt_blob_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvases.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = CanvasStore::open(&path).await;
        assert!(store.list().await.is_empty());
        assert_eq!(store.state_or_initial("x").await, CanvasState::initial());
    }

    #[tokio::test]
    async fn save_preserves_created_at_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = CanvasStore::open(dir.path().join("canvases.json")).await;

        let first = store.save("c1", CanvasState::initial()).await.unwrap();
        assert_eq!(first.name, DEFAULT_CANVAS_NAME);
        assert!(store.rename("c1", "  Dev tools ").await.unwrap());

        let edited = mutation::add_item(&CanvasState::initial(), "solution", None, "CLI");
        let second = store.save("c1", edited.clone()).await.unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.name, "Dev tools");

        let reopened = CanvasStore::open(store.path()).await;
        assert_eq!(reopened.state_or_initial("c1").await, edited);
        assert!(!reopened.rename("missing", "x").await.unwrap());
    }

    #[tokio::test]
    async fn list_is_most_recent_first_and_delete_works() {
        let dir = tempfile::tempdir().unwrap();
        let store = CanvasStore::open(dir.path().join("canvases.json")).await;
        store.save("old", CanvasState::initial()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.save("new", CanvasState::initial()).await.unwrap();

        let ids: Vec<String> = store.list().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);

        assert!(store.delete("old").await.unwrap());
        assert!(!store.delete("old").await.unwrap());
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn debounced_saver_keeps_last_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CanvasStore::open(dir.path().join("canvases.json")).await);
        let saver = DebouncedSaver::new(store.clone(), Duration::from_millis(20));

        let one = mutation::add_item(&CanvasState::initial(), "channels", None, "one");
        let two = mutation::add_item(&one, "channels", None, "two");
        saver.schedule("c1", one).await;
        saver.schedule("c1", two.clone()).await;
        assert_eq!(saver.pending_count().await, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(saver.pending_count().await, 0);
        assert_eq!(store.state_or_initial("c1").await, two);
    }

    #[tokio::test]
    async fn flush_writes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CanvasStore::open(dir.path().join("canvases.json")).await);
        let saver = DebouncedSaver::new(store.clone(), Duration::from_secs(60));
        saver.schedule("c1", CanvasState::initial()).await;
        assert_eq!(saver.flush().await.unwrap(), 1);
        assert!(store.get("c1").await.is_some());
    }

    #[tokio::test]
    async fn failed_writes_leave_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvases.json");
        let store = CanvasStore::open(&path).await;
        store.save("c1", CanvasState::initial()).await.unwrap();

        // A directory where the blob should be makes every write fail.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let edited = mutation::add_item(&CanvasState::initial(), "solution", None, "CLI");
        assert!(store.save("c1", edited).await.is_err());
        assert!(store.save("c2", CanvasState::initial()).await.is_err());
        assert!(store.rename("c1", "Renamed").await.is_err());
        assert!(store.delete("c1").await.is_err());

        let record = store.get("c1").await.unwrap();
        assert_eq!(record.state, CanvasState::initial());
        assert_eq!(record.name, DEFAULT_CANVAS_NAME);
        assert!(store.get("c2").await.is_none());
    }

    #[tokio::test]
    async fn failed_flush_keeps_every_state_pending() {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("canvases.json");
        std::fs::create_dir(&blob).unwrap();
        let store = Arc::new(CanvasStore::open(&blob).await);
        let saver = DebouncedSaver::new(store.clone(), Duration::from_secs(60));
        saver.schedule("c1", CanvasState::initial()).await;
        saver.schedule("c2", CanvasState::initial()).await;

        assert!(saver.flush().await.is_err());
        assert_eq!(saver.pending_count().await, 2);
        assert!(store.get("c1").await.is_none());
        assert!(store.get("c2").await.is_none());
    }
}
