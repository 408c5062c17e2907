//! Secondary index definitions and maintenance
//!
//! An index is a derived table projecting a fixed column list out of every
//! eligible entity. An entity is eligible for an index when it carries every
//! indexed column and agrees with every `match_on` condition. The manager
//! reconciles index tables on each write so that a row exists exactly while
//! the entity is eligible.
//!
//! Index rows live on the shard chosen by the value of the index's first
//! column, so a lookup that binds that column touches one shard per value.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::Backend;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::id::EntityId;
use crate::shard::ShardRouter;
use crate::sql::sanitize::validate_identifier;
use crate::types::{Entity, Fields, Value};

// ============================================================================
// Definitions
// ============================================================================

/// Index definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Index name, also the base of its table name
    pub name: String,

    /// Indexed columns, in key order
    pub columns: Vec<String>,

    /// Required field values for an entity to be indexed
    #[serde(default, rename = "matchOn", skip_serializing_if = "Fields::is_empty")]
    pub match_on: Fields,
}

impl IndexDefinition {
    /// Create a new index definition without match conditions
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            match_on: Fields::new(),
        }
    }

    /// Restrict the index to entities whose fields equal `match_on`
    pub fn match_on(mut self, match_on: Fields) -> Self {
        self.match_on = match_on;
        self
    }

    /// Column that decides which shard holds a row
    pub fn partition_column(&self) -> &str {
        &self.columns[0]
    }

    /// Check name, column list and `match_on` values
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name, &[]).map_err(StoreError::Configuration)?;

        if self.columns.is_empty() {
            return Err(StoreError::configuration(format!(
                "Index '{}' must have at least one column",
                self.name
            )));
        }

        self.match_on.check_finite()?;

        for (i, column) in self.columns.iter().enumerate() {
            if column.is_empty() {
                return Err(StoreError::configuration(format!(
                    "Index '{}' has an empty column name",
                    self.name
                )));
            }
            if self.columns[..i].contains(column) {
                return Err(StoreError::configuration(format!(
                    "Index '{}' lists column '{}' twice",
                    self.name, column
                )));
            }
        }

        Ok(())
    }

    /// Whether an entity with these fields belongs in the index
    pub fn is_eligible(&self, fields: &Fields) -> bool {
        self.columns.iter().all(|c| fields.contains(c))
            && self
                .match_on
                .iter()
                .all(|(name, required)| fields.get(name) == Some(required))
    }

    /// The row this entity should have in the index, if eligible
    pub fn row_for(&self, entity_id: EntityId, fields: &Fields) -> Option<IndexRow> {
        if !self.is_eligible(fields) {
            return None;
        }
        let key = self
            .columns
            .iter()
            .filter_map(|c| fields.get(c).map(|v| (c.clone(), v.clone())))
            .collect();
        Some(IndexRow { key, entity_id })
    }
}

/// Denormalized projection of one entity under one index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    /// Indexed column values, in the index's column order
    pub key: Vec<(String, Value)>,
    pub entity_id: EntityId,
}

impl IndexRow {
    /// Value of the partition column
    pub fn partition_value(&self) -> &Value {
        &self.key[0].1
    }

    /// Whether the leading columns of this row equal `prefix`
    pub fn matches_prefix(&self, prefix: &[(String, Value)]) -> bool {
        prefix.len() <= self.key.len()
            && self
                .key
                .iter()
                .zip(prefix)
                .all(|((column, value), (want_column, want_value))| {
                    column == want_column && value == want_value
                })
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Registry of index definitions, and the code that keeps index tables in
/// step with entity writes
pub struct IndexManager<B> {
    router: Arc<ShardRouter<B>>,
    config: Arc<StoreConfig>,
    definitions: RwLock<HashMap<String, Arc<IndexDefinition>>>,
}

impl<B: Backend> IndexManager<B> {
    pub fn new(router: Arc<ShardRouter<B>>, config: Arc<StoreConfig>) -> Self {
        Self {
            router,
            config,
            definitions: RwLock::new(HashMap::new()),
        }
    }

    /// Register an index definition
    ///
    /// Registering the same definition twice returns the existing one.
    /// Reusing a name for a different definition is a configuration error.
    pub fn define(&self, definition: IndexDefinition) -> Result<Arc<IndexDefinition>> {
        definition.validate()?;

        let mut definitions = self.definitions.write();
        if let Some(existing) = definitions.get(&definition.name) {
            if **existing == definition {
                return Ok(Arc::clone(existing));
            }
            return Err(StoreError::configuration(format!(
                "Index '{}' is already defined with a different definition",
                definition.name
            )));
        }

        info!(
            index = %definition.name,
            columns = ?definition.columns,
            match_on = definition.match_on.len(),
            "Defined index"
        );
        let definition = Arc::new(definition);
        definitions.insert(definition.name.clone(), Arc::clone(&definition));
        Ok(definition)
    }

    pub fn get(&self, name: &str) -> Option<Arc<IndexDefinition>> {
        self.definitions.read().get(name).cloned()
    }

    /// All definitions, ordered by name
    pub fn definitions(&self) -> Vec<Arc<IndexDefinition>> {
        let mut all: Vec<_> = self.definitions.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Table name for an index
    pub fn table(&self, definition: &IndexDefinition) -> String {
        self.config.index_table(&definition.name)
    }

    /// Reconcile every index with a freshly written entity
    ///
    /// `previous` is the row that the write replaced, if any. Stale rows are
    /// retracted first, then rows for the new state are upserted.
    pub async fn on_write(&self, previous: Option<&Entity>, entity: &Entity) -> Result<()> {
        self.retract_stale(previous, entity).await?;
        self.upsert_rows(entity).await
    }

    /// Retract the rows of `previous` that `entity` no longer has
    ///
    /// A row is stale when its key changed or the entity stopped being
    /// eligible. Must run while `previous` is still the stored version, so a
    /// failed retraction is repeated by the next write. Returns the number of
    /// rows retracted; a failure after at least one retraction is a partial
    /// write.
    pub async fn retract_stale(&self, previous: Option<&Entity>, entity: &Entity) -> Result<usize> {
        let Some(previous) = previous else {
            return Ok(0);
        };
        let mut retracted = 0;
        for definition in self.definitions() {
            let Some(stale) = definition.row_for(previous.id, &previous.fields) else {
                continue;
            };
            if definition.row_for(entity.id, &entity.fields).as_ref() == Some(&stale) {
                continue;
            }

            let table = self.table(&definition);
            debug!(index = %definition.name, entity_id = %entity.id, "Retracting stale index row");
            match self.retract(&table, &stale).await {
                Ok(()) => retracted += 1,
                Err(e) if retracted > 0 => {
                    return Err(StoreError::partial_write(entity.id, &table, e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(retracted)
    }

    /// Upsert the row `entity` has in every index it is eligible for
    ///
    /// The entity row is already written, so any failure here is a partial
    /// write.
    pub async fn upsert_rows(&self, entity: &Entity) -> Result<()> {
        for definition in self.definitions() {
            let Some(fresh) = definition.row_for(entity.id, &entity.fields) else {
                continue;
            };
            let table = self.table(&definition);
            self.router
                .route_value(fresh.partition_value())
                .backend()
                .upsert_index_row(&table, &fresh)
                .await
                .map_err(|e| StoreError::partial_write(entity.id, &table, e))?;
        }
        Ok(())
    }

    /// Retract every index row the entity currently has
    ///
    /// Returns the number of rows retracted. A failure after at least one
    /// retraction is reported as a partial write.
    pub async fn on_delete(&self, entity: &Entity) -> Result<usize> {
        let mut retracted = 0;
        for definition in self.definitions() {
            let Some(row) = definition.row_for(entity.id, &entity.fields) else {
                continue;
            };
            let table = self.table(&definition);
            match self.retract(&table, &row).await {
                Ok(()) => retracted += 1,
                Err(e) if retracted > 0 => {
                    return Err(StoreError::partial_write(entity.id, &table, e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(retracted)
    }

    /// Entity ids under one exact key prefix of an index
    pub async fn lookup(
        &self,
        definition: &IndexDefinition,
        key: &[(String, Value)],
    ) -> Result<Vec<EntityId>> {
        let Some((_, partition_value)) = key.first() else {
            return Err(StoreError::no_suitable_index(Vec::<String>::new()));
        };
        let table = self.table(definition);
        self.router
            .route_value(partition_value)
            .backend()
            .lookup_index(&table, key)
            .await
    }

    async fn retract(&self, table: &str, row: &IndexRow) -> Result<()> {
        self.router
            .route_value(row.partition_value())
            .backend()
            .delete_index_row(table, row)
            .await
    }
}
