//! DataStore - main entry point for sharded schema-less storage
//!
//! Ties together shard routing, entity rows and index maintenance. Writes go
//! to the entity row first and then to each index table; those steps are not
//! atomic across shards, so a failure after the entity row is written comes
//! back as [`StoreError::PartialWrite`]. Re-issuing the same put converges.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{Backend, MemoryBackend, PostgresBackend};
use crate::config::StoreConfig;
use crate::entity_store::EntityStore;
use crate::error::{Result, StoreError};
use crate::id::EntityId;
use crate::index::{IndexDefinition, IndexManager};
use crate::query::{Clause, QueryPlan};
use crate::shard::ShardRouter;
use crate::types::{Entity, Fields, Tag};

/// Request to write an entity
#[derive(Debug, Clone, Default)]
pub struct PutRequest {
    /// Type discriminator (default: 0)
    pub tag: Tag,
    /// Existing id to overwrite; a new id is generated when absent
    pub id: Option<EntityId>,
    /// Complete field map to store
    pub fields: Fields,
}

impl PutRequest {
    pub fn new(fields: Fields) -> Self {
        Self {
            tag: 0,
            id: None,
            fields,
        }
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tag = tag;
        self
    }

    pub fn id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }
}

impl From<Fields> for PutRequest {
    fn from(fields: Fields) -> Self {
        Self::new(fields)
    }
}

struct Inner<B> {
    config: Arc<StoreConfig>,
    router: Arc<ShardRouter<B>>,
    entities: EntityStore<B>,
    indexes: IndexManager<B>,
}

/// Sharded entity store with derived secondary indexes
///
/// Cheap to clone; clones share shards and the index registry.
pub struct DataStore<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for DataStore<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl DataStore<MemoryBackend> {
    /// Store over `shard_count` in-process shards
    pub fn in_memory(shard_count: usize) -> Result<Self> {
        let backends = (0..shard_count).map(|_| MemoryBackend::new()).collect();
        Self::with_backends(StoreConfig::local(shard_count), backends)
    }
}

impl DataStore<PostgresBackend> {
    /// Connect to every configured Postgres shard
    ///
    /// Tables must already exist; see [`crate::sql::DdlGenerator`].
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let mut backends = Vec::with_capacity(config.shards.len());
        for address in &config.shards {
            backends.push(PostgresBackend::connect(&config.connection_url(address)).await?);
        }
        Self::with_backends(config, backends)
    }
}

impl<B: Backend> DataStore<B> {
    /// Build a store from a configuration and one backend per shard address
    pub fn with_backends(config: StoreConfig, backends: Vec<B>) -> Result<Self> {
        config.validate()?;
        if backends.len() != config.shards.len() {
            return Err(StoreError::configuration(format!(
                "{} shard addresses configured but {} backends given",
                config.shards.len(),
                backends.len()
            )));
        }

        let config = Arc::new(config);
        let router = Arc::new(ShardRouter::new(
            config.shards.iter().cloned().zip(backends).collect(),
        )?);

        Ok(Self {
            inner: Arc::new(Inner {
                entities: EntityStore::new(Arc::clone(&router), config.entities_table.clone()),
                indexes: IndexManager::new(Arc::clone(&router), Arc::clone(&config)),
                config,
                router,
            }),
        })
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn router(&self) -> &ShardRouter<B> {
        &self.inner.router
    }

    pub fn entities(&self) -> &EntityStore<B> {
        &self.inner.entities
    }

    pub fn index_manager(&self) -> &IndexManager<B> {
        &self.inner.indexes
    }

    // =========================================================================
    // Index Operations
    // =========================================================================

    /// Register an index over `columns`, optionally filtered by `match_on`
    pub fn define_index<I, S>(
        &self,
        name: &str,
        columns: I,
        match_on: Option<Fields>,
    ) -> Result<Index<B>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let definition = IndexDefinition::new(name, columns).match_on(match_on.unwrap_or_default());
        self.define(definition)
    }

    /// Register a prepared index definition
    pub fn define(&self, definition: IndexDefinition) -> Result<Index<B>> {
        let definition = self.inner.indexes.define(definition)?;
        Ok(Index {
            store: self.clone(),
            definition,
        })
    }

    /// Handle to a registered index
    pub fn index(&self, name: &str) -> Option<Index<B>> {
        self.inner.indexes.get(name).map(|definition| Index {
            store: self.clone(),
            definition,
        })
    }

    /// All registered index definitions, ordered by name
    pub fn indexes(&self) -> Vec<Arc<IndexDefinition>> {
        self.inner.indexes.definitions()
    }

    // =========================================================================
    // Entity Operations
    // =========================================================================

    /// Write an entity and reconcile every index with it
    ///
    /// Stale index rows are retracted while the replaced row is still
    /// stored, then the entity row is written, then fresh index rows are
    /// upserted. Whichever step fails, repeating the same put finishes the
    /// job. Non-finite floats are rejected before anything is written.
    pub async fn put(&self, request: impl Into<PutRequest>) -> Result<Entity> {
        let request = request.into();
        request.fields.check_finite()?;

        let written = self
            .inner
            .entities
            .prepare(request.tag, request.fields.canonical(), request.id)
            .await?;
        let entity = &written.entity;

        let retracted = self
            .inner
            .indexes
            .retract_stale(written.previous.as_ref(), entity)
            .await
            .inspect_err(|e| {
                warn!(entity_id = %entity.id, error = %e, "Stale index retraction failed");
            })?;

        if let Err(e) = self.inner.entities.write(entity).await {
            if retracted > 0 {
                warn!(entity_id = %entity.id, error = %e, "Entity write failed after index retraction");
                return Err(StoreError::partial_write(entity.id, self.inner.entities.table(), e));
            }
            return Err(e);
        }

        debug!(
            entity_id = %entity.id,
            tag = entity.tag,
            replaced = written.previous.is_some(),
            retracted,
            "Stored entity"
        );

        if let Err(e) = self.inner.indexes.upsert_rows(entity).await {
            warn!(entity_id = %entity.id, error = %e, "Index maintenance failed after entity write");
            return Err(e);
        }

        Ok(written.entity)
    }

    /// Point lookup by id
    pub async fn get(&self, id: &EntityId) -> Result<Option<Entity>> {
        self.inner.entities.get(id).await
    }

    /// Delete an entity given either the entity or its id, not both
    ///
    /// Index rows are retracted before the entity row is removed. An id that
    /// does not resolve is a not-found error; an entity that is already gone
    /// has its index rows retracted and is otherwise a no-op.
    pub async fn delete(&self, entity: Option<&Entity>, id: Option<EntityId>) -> Result<()> {
        let target = match (entity, id) {
            (Some(entity), None) => self
                .inner
                .entities
                .get(&entity.id)
                .await?
                .unwrap_or_else(|| entity.clone()),
            (None, Some(id)) => self
                .inner
                .entities
                .get(&id)
                .await?
                .ok_or_else(|| StoreError::not_found(format!("Entity {}", id)))?,
            (Some(_), Some(_)) => {
                return Err(StoreError::invalid_argument(
                    "delete takes an entity or an id, not both",
                ));
            }
            (None, None) => {
                return Err(StoreError::invalid_argument(
                    "delete requires an entity or an id",
                ));
            }
        };

        let retracted = self.inner.indexes.on_delete(&target).await?;

        if let Err(e) = self.inner.entities.delete(&target.id).await {
            if retracted > 0 {
                warn!(entity_id = %target.id, error = %e, "Entity delete failed after index retraction");
                return Err(StoreError::partial_write(target.id, self.inner.entities.table(), e));
            }
            return Err(e);
        }

        debug!(entity_id = %target.id, retracted, "Deleted entity");
        Ok(())
    }

    pub async fn delete_entity(&self, entity: &Entity) -> Result<()> {
        self.delete(Some(entity), None).await
    }

    pub async fn delete_id(&self, id: EntityId) -> Result<()> {
        self.delete(None, Some(id)).await
    }

    /// Query through whichever registered index covers the clauses
    pub async fn query(&self, clauses: &[Clause]) -> Result<Vec<Entity>> {
        let definitions = self.inner.indexes.definitions();
        let index = QueryPlan::select(&definitions, clauses)?;
        self.run(index, clauses).await
    }

    async fn run(&self, index: &IndexDefinition, clauses: &[Clause]) -> Result<Vec<Entity>> {
        QueryPlan::new(index, clauses)?
            .execute(&self.inner.indexes, &self.inner.entities)
            .await
    }
}

/// Handle to one registered index
pub struct Index<B> {
    store: DataStore<B>,
    definition: Arc<IndexDefinition>,
}

impl<B> Clone for Index<B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            definition: Arc::clone(&self.definition),
        }
    }
}

impl<B: Backend> Index<B> {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    /// Entities matching every clause, hydrated from the entity store
    ///
    /// The clauses must reference a leading prefix of this index's columns.
    pub async fn query(&self, clauses: &[Clause]) -> Result<Vec<Entity>> {
        self.store.run(&self.definition, clauses).await
    }

    /// First matching entity, if any
    pub async fn get(&self, clauses: &[Clause]) -> Result<Option<Entity>> {
        Ok(self.query(clauses).await?.into_iter().next())
    }
}

impl<B> std::fmt::Debug for Index<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("definition", &self.definition)
            .finish()
    }
}
