//! In-process backend
//!
//! Keeps each table in memory behind a `parking_lot` lock. Used for tests and
//! for embedding the store without a database.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::backend::Backend;
use crate::error::Result;
use crate::id::EntityId;
use crate::index::IndexRow;
use crate::types::{Entity, Value};

/// Process-local tables for one shard
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entities: RwLock<HashMap<String, HashMap<EntityId, Entity>>>,
    indexes: RwLock<HashMap<String, Vec<IndexRow>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in an entities table
    pub fn entity_count(&self, table: &str) -> usize {
        self.entities.read().get(table).map_or(0, HashMap::len)
    }

    /// Snapshot of an index table
    pub fn index_rows(&self, table: &str) -> Vec<IndexRow> {
        self.indexes.read().get(table).cloned().unwrap_or_default()
    }
}

impl Backend for MemoryBackend {
    async fn upsert_entity(&self, table: &str, entity: &Entity) -> Result<()> {
        self.entities
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(entity.id, entity.clone());
        Ok(())
    }

    async fn get_entity(&self, table: &str, id: &EntityId) -> Result<Option<Entity>> {
        Ok(self
            .entities
            .read()
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    async fn delete_entity(&self, table: &str, id: &EntityId) -> Result<()> {
        if let Some(rows) = self.entities.write().get_mut(table) {
            rows.remove(id);
        }
        Ok(())
    }

    async fn upsert_index_row(&self, table: &str, row: &IndexRow) -> Result<()> {
        let mut indexes = self.indexes.write();
        let rows = indexes.entry(table.to_string()).or_default();
        if !rows.contains(row) {
            rows.push(row.clone());
        }
        Ok(())
    }

    async fn delete_index_row(&self, table: &str, row: &IndexRow) -> Result<()> {
        if let Some(rows) = self.indexes.write().get_mut(table) {
            rows.retain(|existing| existing != row);
        }
        Ok(())
    }

    async fn lookup_index(&self, table: &str, key: &[(String, Value)]) -> Result<Vec<EntityId>> {
        let indexes = self.indexes.read();
        let Some(rows) = indexes.get(table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter(|row| row.matches_prefix(key))
            .map(|row| row.entity_id)
            .collect())
    }
}
