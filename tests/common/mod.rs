//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use schemaless_store::{
    Backend, DataStore, Entity, EntityId, IndexRow, MemoryBackend, Result, StoreConfig,
    StoreError, Value,
};

/// Failure switches shared by every flaky shard
///
/// `budget` counts index writes allowed before they start failing.
#[derive(Debug)]
pub struct Faults {
    budget: AtomicUsize,
    entity_writes: AtomicBool,
}

impl Faults {
    fn new() -> Self {
        Self {
            budget: AtomicUsize::new(usize::MAX),
            entity_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_all(&self) {
        self.budget.store(0, Ordering::SeqCst);
    }

    /// Allow `writes` more index writes, then fail
    pub fn fail_after(&self, writes: usize) {
        self.budget.store(writes, Ordering::SeqCst);
    }

    pub fn fail_entity_writes(&self) {
        self.entity_writes.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.budget.store(usize::MAX, Ordering::SeqCst);
        self.entity_writes.store(false, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

/// Memory shard whose writes fail on demand
pub struct FlakyBackend {
    inner: MemoryBackend,
    faults: Arc<Faults>,
}

impl FlakyBackend {
    /// Raw rows of an index table on this shard
    pub fn index_rows(&self, table: &str) -> Vec<IndexRow> {
        self.inner.index_rows(table)
    }

    fn check(&self) -> Result<()> {
        if self.faults.take() {
            Ok(())
        } else {
            Err(StoreError::backend("index shard unavailable"))
        }
    }
}

impl Backend for FlakyBackend {
    async fn upsert_entity(&self, table: &str, entity: &Entity) -> Result<()> {
        if self.faults.entity_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("entity shard unavailable"));
        }
        self.inner.upsert_entity(table, entity).await
    }

    async fn get_entity(&self, table: &str, id: &EntityId) -> Result<Option<Entity>> {
        self.inner.get_entity(table, id).await
    }

    async fn delete_entity(&self, table: &str, id: &EntityId) -> Result<()> {
        self.inner.delete_entity(table, id).await
    }

    async fn upsert_index_row(&self, table: &str, row: &IndexRow) -> Result<()> {
        self.check()?;
        self.inner.upsert_index_row(table, row).await
    }

    async fn delete_index_row(&self, table: &str, row: &IndexRow) -> Result<()> {
        self.check()?;
        self.inner.delete_index_row(table, row).await
    }

    async fn lookup_index(&self, table: &str, key: &[(String, Value)]) -> Result<Vec<EntityId>> {
        self.inner.lookup_index(table, key).await
    }
}

/// Raw rows of an index table across every shard, unfiltered by queries
pub fn raw_index_rows(store: &DataStore<FlakyBackend>, table: &str) -> Vec<IndexRow> {
    store
        .router()
        .shards()
        .iter()
        .flat_map(|shard| shard.backend().index_rows(table))
        .collect()
}

/// Store over `shards` flaky memory shards sharing one fault budget
pub fn flaky_store(shards: usize) -> (DataStore<FlakyBackend>, Arc<Faults>) {
    let faults = Arc::new(Faults::new());
    let backends = (0..shards)
        .map(|_| FlakyBackend {
            inner: MemoryBackend::new(),
            faults: Arc::clone(&faults),
        })
        .collect();
    let store = DataStore::with_backends(StoreConfig::local(shards), backends)
        .expect("Should build flaky store");
    (store, faults)
}
