//! Run-record storage.
//!
//! [`BatchStore`] is the seam shared by the job dispatcher (writer) and the
//! download endpoint (reader). [`InMemoryBatchStore`] keeps records for the
//! process lifetime, or until an optional TTL elapses.
//!
//! **Access rules:**
//! - at most one `put` per [`BatchId`]; a second `put` for a live id is rejected
//! - records are immutable once stored

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use keywordkit_shared::{BatchId, BatchRecord, KeywordKitError, Result};

/// Keyed store of completed batches.
pub trait BatchStore: Send + Sync {
    /// Store `record` under `id`. Fails if a live record already uses `id`.
    fn put(&self, id: BatchId, record: BatchRecord) -> Result<()>;

    /// Fetch the record stored under `id`, if any.
    fn get(&self, id: &BatchId) -> Result<Option<Arc<BatchRecord>>>;
}

struct Entry {
    record: Arc<BatchRecord>,
    stored_at: Instant,
}

/// Process-local [`BatchStore`] behind an `RwLock`.
pub struct InMemoryBatchStore {
    records: RwLock<HashMap<BatchId, Entry>>,
    ttl: Option<Duration>,
}

impl InMemoryBatchStore {
    /// A store that never evicts.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            ttl: None,
        }
    }

    /// A store whose records expire `ttl` after being stored.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(entry.stored_at) >= ttl)
    }

    /// Drop expired records. Returns how many were removed.
    pub fn evict_expired(&self) -> Result<usize> {
        if self.ttl.is_none() {
            return Ok(0);
        }
        let now = Instant::now();
        let mut records = self.records.write().map_err(poisoned)?;
        let before = records.len();
        records.retain(|_, entry| !self.is_expired(entry, now));
        let removed = before - records.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = records.len(), "evicted expired batches");
        }
        Ok(removed)
    }

    /// Number of records currently held, expired or not.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBatchStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchStore for InMemoryBatchStore {
    fn put(&self, id: BatchId, record: BatchRecord) -> Result<()> {
        let now = Instant::now();
        let mut records = self.records.write().map_err(poisoned)?;

        if let Some(existing) = records.get(&id) {
            if !self.is_expired(existing, now) {
                return Err(KeywordKitError::Storage(format!(
                    "batch {id} already stored"
                )));
            }
        }

        records.insert(
            id,
            Entry {
                record: Arc::new(record),
                stored_at: now,
            },
        );
        tracing::debug!(%id, "batch stored");
        Ok(())
    }

    fn get(&self, id: &BatchId) -> Result<Option<Arc<BatchRecord>>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .get(id)
            .filter(|entry| !self.is_expired(entry, Instant::now()))
            .map(|entry| Arc::clone(&entry.record)))
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> KeywordKitError {
    KeywordKitError::Storage("batch store lock poisoned".into())
}
