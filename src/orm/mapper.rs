//! Typed access to one entity type
//!
//! A [`Mapper`] binds an [`EntitySchema`] to a data store and a session.
//! Queries go through the schema's bound indexes and only return entities
//! carrying the schema's tag.

use std::sync::Arc;

use crate::backend::Backend;
use crate::error::{Result, StoreError};
use crate::orm::record::Record;
use crate::orm::schema::EntitySchema;
use crate::orm::session::Session;
use crate::query::{Clause, col};
use crate::store::DataStore;
use crate::types::{Fields, Value};

pub(crate) struct MapperInner<B> {
    pub(crate) store: DataStore<B>,
    pub(crate) schema: EntitySchema,
}

/// Entry point for creating and querying records of one type
pub struct Mapper<B> {
    inner: Arc<MapperInner<B>>,
    session: Session<B>,
}

impl<B> Clone for Mapper<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            session: self.session.clone(),
        }
    }
}

impl<B> std::fmt::Debug for Mapper<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("schema", &self.inner.schema)
            .finish()
    }
}

impl<B: Backend> Mapper<B> {
    /// Bind a schema to a store and session
    ///
    /// Every index binding must name a registered index with the same
    /// columns.
    pub fn new(store: DataStore<B>, session: Session<B>, schema: EntitySchema) -> Result<Self> {
        for binding in &schema.indexes {
            let index = store.index(&binding.name).ok_or_else(|| {
                StoreError::configuration(format!("Index '{}' is not defined", binding.name))
            })?;
            if index.definition().columns != binding.columns {
                return Err(StoreError::configuration(format!(
                    "Index '{}' is defined over [{}], not [{}]",
                    binding.name,
                    index.definition().columns.join(", "),
                    binding.columns.join(", ")
                )));
            }
        }

        Ok(Self {
            inner: Arc::new(MapperInner { store, schema }),
            session,
        })
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.inner.schema
    }

    pub fn session(&self) -> &Session<B> {
        &self.session
    }

    /// New empty record; dirty, not saveable, not yet buffered
    pub fn create(&self) -> Record<B> {
        Record::new(Arc::clone(&self.inner), self.session.clone())
    }

    /// New record with the given fields set
    pub fn create_with(&self, fields: Fields) -> Record<B> {
        let record = self.create();
        for (name, value) in fields {
            record.set(name, value);
        }
        record
    }

    /// Records matching every clause, marked clean
    pub async fn query(&self, clauses: &[Clause]) -> Result<Vec<Record<B>>> {
        let binding = self.inner.schema.binding_for(clauses)?;
        let index = self.inner.store.index(&binding.name).ok_or_else(|| {
            StoreError::configuration(format!("Index '{}' is not defined", binding.name))
        })?;

        Ok(index
            .query(clauses)
            .await?
            .into_iter()
            .filter(|entity| entity.tag == self.inner.schema.tag)
            .map(|entity| Record::hydrate(Arc::clone(&self.inner), self.session.clone(), entity))
            .collect())
    }

    /// First record matching every clause
    pub async fn get(&self, clauses: &[Clause]) -> Result<Option<Record<B>>> {
        Ok(self.query(clauses).await?.into_iter().next())
    }

    /// Record whose identity field equals `identity`
    pub async fn find(&self, identity: impl Into<Value>) -> Result<Option<Record<B>>> {
        let id_field = self.inner.schema.id_field.as_str();
        self.get(&[col(id_field).equals(identity)]).await
    }
}
