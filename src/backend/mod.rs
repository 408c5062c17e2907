//! Storage collaborators
//!
//! A [`Backend`] is one shard of the tabular storage engine. The core only
//! needs keyed upsert, lookup and delete on the entities table, plus upsert,
//! delete and column-prefix lookup on index tables. Tables are expected to be
//! provisioned already; backends never issue DDL.

pub mod memory;
pub mod postgres;

use std::future::Future;

use crate::error::Result;
use crate::id::EntityId;
use crate::index::IndexRow;
use crate::types::{Entity, Value};

pub use memory::MemoryBackend;
pub use postgres::PostgresBackend;

/// One shard of the backing store
pub trait Backend: Send + Sync + 'static {
    /// Insert or wholesale-replace the entity row keyed by `entity.id`
    fn upsert_entity(&self, table: &str, entity: &Entity) -> impl Future<Output = Result<()>> + Send;

    /// Point lookup by primary key
    fn get_entity(
        &self,
        table: &str,
        id: &EntityId,
    ) -> impl Future<Output = Result<Option<Entity>>> + Send;

    /// Remove the entity row; absent ids are a no-op
    fn delete_entity(&self, table: &str, id: &EntityId) -> impl Future<Output = Result<()>> + Send;

    /// Insert the index row keyed by `(row.key..., row.entity_id)` if absent
    fn upsert_index_row(&self, table: &str, row: &IndexRow)
    -> impl Future<Output = Result<()>> + Send;

    /// Remove the index row with exactly this key and entity id, if present
    fn delete_index_row(&self, table: &str, row: &IndexRow)
    -> impl Future<Output = Result<()>> + Send;

    /// Entity ids of rows whose leading columns equal `key`, in order
    fn lookup_index(
        &self,
        table: &str,
        key: &[(String, Value)],
    ) -> impl Future<Output = Result<Vec<EntityId>>> + Send;
}
