//! Buffered persistence of mapped records
//!
//! A session remembers, in registration order, every record whose persisted
//! fields changed. It holds records weakly: a record dropped by its owner
//! simply falls out of the buffer. Flushing is sequential with no atomicity
//! across records.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::error::{Result, StoreError};
use crate::id::EntityId;
use crate::orm::record::{Record, RecordCell};

struct Pending<B> {
    order: Vec<(u64, Weak<RecordCell<B>>)>,
    keys: HashSet<u64>,
}

impl<B> Pending<B> {
    fn remove(&mut self, key: u64) {
        if self.keys.remove(&key) {
            self.order.retain(|(k, _)| *k != key);
        }
    }
}

/// Buffer of records awaiting a flush
///
/// Cheap to clone; clones share the buffer.
pub struct Session<B> {
    pending: Arc<Mutex<Pending<B>>>,
}

impl<B> Clone for Session<B> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<B> Default for Session<B> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(Pending {
                order: Vec::new(),
                keys: HashSet::new(),
            })),
        }
    }
}

impl<B: Backend> Session<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a record; registering it again keeps its original position
    pub(crate) fn register(&self, cell: &Arc<RecordCell<B>>) {
        let mut pending = self.pending.lock();
        if pending.keys.insert(cell.key) {
            pending.order.push((cell.key, Arc::downgrade(cell)));
        }
    }

    /// Number of buffered records, including any not yet saveable
    pub fn pending_len(&self) -> usize {
        self.pending.lock().order.len()
    }

    /// Whether `record` is buffered in this session
    pub fn is_pending(&self, record: &Record<B>) -> bool {
        self.pending.lock().keys.contains(&record.cell().key)
    }

    /// Save every buffered record, in registration order
    ///
    /// Records already clean are dropped from the buffer without a write, and
    /// records not yet saveable stay buffered. Stops at the first failure
    /// with [`StoreError::SessionFlush`], which lists the entities saved so
    /// far; the failing record and everything after it stay buffered.
    pub async fn save(&self) -> Result<Vec<EntityId>> {
        let snapshot: Vec<(u64, Weak<RecordCell<B>>)> = self.pending.lock().order.clone();
        let mut saved = Vec::new();

        for (key, weak) in snapshot {
            let Some(cell) = weak.upgrade() else {
                self.pending.lock().remove(key);
                continue;
            };
            let record = Record::from_cell(cell);

            if !record.is_dirty() {
                self.pending.lock().remove(key);
                continue;
            }
            if !record.saveable() {
                debug!(record = key, "Leaving unsaveable record buffered");
                continue;
            }

            match record.save().await {
                Ok(id) => {
                    // mutated again mid-write: keep it for the next flush
                    if !record.is_dirty() {
                        self.pending.lock().remove(key);
                    }
                    saved.push(id);
                }
                Err(e) => {
                    warn!(record = key, saved = saved.len(), error = %e, "Session flush stopped");
                    return Err(StoreError::SessionFlush {
                        saved,
                        source: Box::new(e),
                    });
                }
            }
        }

        debug!(saved = saved.len(), remaining = self.pending_len(), "Session flushed");
        Ok(saved)
    }
}
