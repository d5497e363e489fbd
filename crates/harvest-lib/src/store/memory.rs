//! In-memory document store with optional JSON snapshot
//!
//! Records are grouped per user in a `DashMap`. When a snapshot path is set,
//! the full store is rewritten after every save (temp file, then rename) and
//! reloaded on startup.

use super::{PredictionStore, StoreError};
use crate::models::{PredictionRecord, PredictionRequest, PredictionResult, RecordId, UserIdentity};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_id: u64,
    records: Vec<PredictionRecord>,
}

pub struct MemoryStore {
    records: DashMap<String, Vec<PredictionRecord>>,
    next_id: AtomicU64,
    snapshot_path: Option<PathBuf>,
    /// Held across id assignment, snapshot write and commit, so saves land in id order
    write_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicU64::new(1),
            snapshot_path: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Create a store persisted to `path`, loading any existing snapshot
    pub fn with_snapshot(path: PathBuf) -> Self {
        let mut store = Self::new();

        if path.exists() {
            match Self::load_snapshot(&path) {
                Ok(snapshot) => {
                    let count = snapshot.records.len();
                    let max_seen = snapshot
                        .records
                        .iter()
                        .filter_map(|r| record_seq(&r.id))
                        .max()
                        .unwrap_or(0);
                    store
                        .next_id
                        .store(snapshot.next_id.max(max_seen + 1), Ordering::SeqCst);
                    for record in snapshot.records {
                        store
                            .records
                            .entry(record.user_id.clone())
                            .or_default()
                            .push(record);
                    }
                    info!(path = %path.display(), records = count, "Loaded prediction snapshot");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to load prediction snapshot, starting fresh");
                }
            }
        }

        store.snapshot_path = Some(path);
        store
    }

    fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Total records across all users
    pub fn len(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every committed record plus `pending` to the snapshot file
    async fn write_snapshot(
        &self,
        path: &Path,
        next_id: u64,
        pending: &PredictionRecord,
    ) -> Result<(), StoreError> {
        // Collect before any await so no DashMap guard is held across it
        let mut records: Vec<PredictionRecord> = self
            .records
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        records.push(pending.clone());
        let snapshot = Snapshot { next_id, records };
        let content = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = path.with_extension("tmp");
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), records = snapshot.records.len(), "Flushed prediction snapshot");
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn record_seq(id: &str) -> Option<u64> {
    id.strip_prefix("pred-")?.parse().ok()
}

#[async_trait]
impl PredictionStore for MemoryStore {
    async fn save(
        &self,
        user: &UserIdentity,
        request: &PredictionRequest,
        result: &PredictionResult,
    ) -> Result<RecordId, StoreError> {
        let _guard = self.write_lock.lock().await;

        let seq = self.next_id.load(Ordering::SeqCst);
        let id = format!("pred-{}", seq);
        let record = PredictionRecord::new(id.clone(), user, request, result);

        if let Some(path) = &self.snapshot_path {
            self.write_snapshot(path, seq + 1, &record).await?;
        }

        // No await from here on: a cancelled or failed save never becomes visible.
        self.next_id.store(seq + 1, Ordering::SeqCst);
        self.records
            .entry(user.uid.clone())
            .or_default()
            .push(record);
        Ok(id)
    }

    async fn list(&self, user: &UserIdentity, limit: usize) -> Result<Vec<PredictionRecord>, StoreError> {
        Ok(self
            .records
            .get(&user.uid)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, user: &UserIdentity, id: &str) -> Result<PredictionRecord, StoreError> {
        self.records
            .get(&user.uid)
            .and_then(|records| records.iter().find(|r| r.id == id).cloned())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}
