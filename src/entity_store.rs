//! Primary entity persistence
//!
//! Entity rows are keyed by id and routed to one shard by that id. A put
//! replaces the whole field map.

use std::sync::Arc;

use chrono::Utc;

use crate::backend::Backend;
use crate::error::Result;
use crate::id::EntityId;
use crate::shard::ShardRouter;
use crate::types::{Entity, Fields, Tag};

/// Outcome of a put: the stored row and the row it replaced
#[derive(Debug, Clone)]
pub struct Written {
    pub previous: Option<Entity>,
    pub entity: Entity,
}

/// Keyed store of entity rows across shards
pub struct EntityStore<B> {
    router: Arc<ShardRouter<B>>,
    table: String,
}

impl<B: Backend> EntityStore<B> {
    pub fn new(router: Arc<ShardRouter<B>>, table: impl Into<String>) -> Self {
        Self {
            router,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Write a field map, generating an id when none is given
    pub async fn put(&self, tag: Tag, fields: Fields, id: Option<EntityId>) -> Result<Entity> {
        Ok(self.put_replacing(tag, fields, id).await?.entity)
    }

    /// Write a field map and return the row it replaced
    ///
    /// `created_at` carries over from the replaced row.
    pub async fn put_replacing(
        &self,
        tag: Tag,
        fields: Fields,
        id: Option<EntityId>,
    ) -> Result<Written> {
        let written = self.prepare(tag, fields, id).await?;
        self.write(&written.entity).await?;
        Ok(written)
    }

    /// Build the row a put would store, without writing it
    ///
    /// Reads the row currently stored under `id` so callers can act on it
    /// before it is overwritten.
    pub async fn prepare(&self, tag: Tag, fields: Fields, id: Option<EntityId>) -> Result<Written> {
        let previous = match id {
            Some(id) => self.get(&id).await?,
            None => None,
        };

        let id = id.unwrap_or_else(EntityId::generate);
        let mut entity = Entity::new(id, tag, fields);
        if let Some(previous) = &previous {
            entity.created_at = previous.created_at;
            entity.updated_at = Utc::now().max(previous.updated_at);
        }
        Ok(Written { previous, entity })
    }

    /// Upsert a prepared row on the shard its id routes to
    pub async fn write(&self, entity: &Entity) -> Result<()> {
        self.router
            .route(&entity.id)
            .backend()
            .upsert_entity(&self.table, entity)
            .await
    }

    pub async fn get(&self, id: &EntityId) -> Result<Option<Entity>> {
        self.router.route(id).backend().get_entity(&self.table, id).await
    }

    /// Remove an entity row; absent ids are a no-op
    pub async fn delete(&self, id: &EntityId) -> Result<()> {
        self.router
            .route(id)
            .backend()
            .delete_entity(&self.table, id)
            .await
    }
}
