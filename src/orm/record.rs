//! Mapped records
//!
//! A [`Record`] is a shared handle to one mapped instance. Field mutators
//! update local state, mark the record dirty when a persisted field changes
//! and register it with its session for the next flush.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::backend::Backend;
use crate::error::{Result, StoreError};
use crate::id::EntityId;
use crate::orm::mapper::MapperInner;
use crate::orm::session::Session;
use crate::store::PutRequest;
use crate::types::{Entity, Fields, Value};

static NEXT_RECORD_KEY: AtomicU64 = AtomicU64::new(1);

/// Where a record is in its save/delete lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No persisted field set
    New,
    /// Some persisted fields set
    Partial,
    /// Every persisted field set, not yet written
    Ready,
    /// Written and unchanged since
    Clean,
    /// Removed from the store
    Deleted,
}

#[derive(Debug)]
pub(crate) struct RecordState {
    fields: Fields,
    entity_id: Option<EntityId>,
    is_dirty: bool,
    deleted: bool,
    /// Bumped on every persisted-field mutation
    version: u64,
}

pub(crate) struct RecordCell<B> {
    pub(crate) key: u64,
    mapper: Arc<MapperInner<B>>,
    session: Session<B>,
    state: Mutex<RecordState>,
}

/// Handle to one mapped instance
///
/// Clones share the same instance.
pub struct Record<B> {
    cell: Arc<RecordCell<B>>,
}

impl<B> Clone for Record<B> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<B: Backend> Record<B> {
    /// Fresh unsaved instance
    pub(crate) fn new(mapper: Arc<MapperInner<B>>, session: Session<B>) -> Self {
        Self::with_state(
            mapper,
            session,
            RecordState {
                fields: Fields::new(),
                entity_id: None,
                is_dirty: true,
                deleted: false,
                version: 0,
            },
        )
    }

    /// Instance hydrated from a stored entity
    pub(crate) fn hydrate(mapper: Arc<MapperInner<B>>, session: Session<B>, entity: Entity) -> Self {
        Self::with_state(
            mapper,
            session,
            RecordState {
                fields: entity.fields,
                entity_id: Some(entity.id),
                is_dirty: false,
                deleted: false,
                version: 0,
            },
        )
    }

    fn with_state(mapper: Arc<MapperInner<B>>, session: Session<B>, state: RecordState) -> Self {
        Self {
            cell: Arc::new(RecordCell {
                key: NEXT_RECORD_KEY.fetch_add(1, Ordering::Relaxed),
                mapper,
                session,
                state: Mutex::new(state),
            }),
        }
    }

    pub(crate) fn from_cell(cell: Arc<RecordCell<B>>) -> Self {
        Self { cell }
    }

    pub(crate) fn cell(&self) -> &Arc<RecordCell<B>> {
        &self.cell
    }

    // =========================================================================
    // Field Access
    // =========================================================================

    pub fn get(&self, name: &str) -> Option<Value> {
        self.cell.state.lock().fields.get(name).cloned()
    }

    /// Snapshot of every local field
    pub fn fields(&self) -> Fields {
        self.cell.state.lock().fields.clone()
    }

    /// Value of the schema's identity field
    pub fn identity(&self) -> Option<Value> {
        self.get(&self.cell.mapper.schema.id_field)
    }

    /// Id of the stored entity, once saved or hydrated
    pub fn entity_id(&self) -> Option<EntityId> {
        self.cell.state.lock().entity_id
    }

    /// Set a field
    ///
    /// Setting a persisted field marks the record dirty and buffers it in its
    /// session. Other fields stay local and are never written.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> &Self {
        let name = name.into();
        let persisted = self.cell.mapper.schema.is_persisted(&name);
        {
            let mut state = self.cell.state.lock();
            state.fields.insert(name, value);
            if persisted {
                state.is_dirty = true;
                state.version += 1;
            }
        }
        if persisted {
            self.cell.session.register(&self.cell);
        }
        self
    }

    /// Clear a field; returns the old value
    pub fn unset(&self, name: &str) -> Option<Value> {
        let persisted = self.cell.mapper.schema.is_persisted(name);
        let previous = {
            let mut state = self.cell.state.lock();
            let previous = state.fields.remove(name);
            if persisted && previous.is_some() {
                state.is_dirty = true;
                state.version += 1;
            }
            previous
        };
        if persisted && previous.is_some() {
            self.cell.session.register(&self.cell);
        }
        previous
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn is_dirty(&self) -> bool {
        self.cell.state.lock().is_dirty
    }

    /// Every persisted field has a value, regardless of dirty state
    pub fn saveable(&self) -> bool {
        self.cell.mapper.schema.saveable(&self.cell.state.lock().fields)
    }

    pub fn state(&self) -> LifecycleState {
        let state = self.cell.state.lock();
        let schema = &self.cell.mapper.schema;
        if !state.is_dirty {
            if state.deleted {
                return LifecycleState::Deleted;
            }
            if state.entity_id.is_some() {
                return LifecycleState::Clean;
            }
        }
        match schema.persisted_count(&state.fields) {
            0 => LifecycleState::New,
            n if n == schema.persist.len() => LifecycleState::Ready,
            _ => LifecycleState::Partial,
        }
    }

    /// Write the persisted fields to the store
    ///
    /// Adopts the store-assigned id on first save and clears the dirty flag,
    /// unless the record was mutated again while the write was in flight. A
    /// partial write also adopts the id but leaves the record dirty.
    pub async fn save(&self) -> Result<EntityId> {
        let schema = &self.cell.mapper.schema;
        let (fields, entity_id, version) = {
            let state = self.cell.state.lock();
            if !schema.saveable(&state.fields) {
                let missing: Vec<&str> = schema
                    .persist
                    .iter()
                    .filter(|p| !state.fields.contains(p))
                    .map(String::as_str)
                    .collect();
                return Err(StoreError::invalid_argument(format!(
                    "Record is not saveable, missing fields: {}",
                    missing.join(", ")
                )));
            }
            (schema.persisted(&state.fields), state.entity_id, state.version)
        };

        let mut request = PutRequest::new(fields).tag(schema.tag);
        if let Some(id) = entity_id {
            request = request.id(id);
        }
        let entity = match self.cell.mapper.store.put(request).await {
            Ok(entity) => entity,
            Err(e) => {
                // the entity row exists; retries must overwrite it
                if let StoreError::PartialWrite { entity_id, .. } = &e {
                    self.cell.state.lock().entity_id = Some(*entity_id);
                }
                return Err(e);
            }
        };

        let mut state = self.cell.state.lock();
        state.entity_id = Some(entity.id);
        state.deleted = false;
        if state.version == version {
            state.is_dirty = false;
        }
        Ok(entity.id)
    }

    /// Remove the stored entity
    ///
    /// Local field values stay readable afterwards.
    pub async fn delete(&self) -> Result<()> {
        let entity_id = self
            .entity_id()
            .ok_or_else(|| StoreError::not_found("Record has never been saved"))?;

        self.cell.mapper.store.delete_id(entity_id).await?;

        let mut state = self.cell.state.lock();
        state.is_dirty = false;
        state.deleted = true;
        Ok(())
    }
}

impl<B> std::fmt::Debug for Record<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("key", &self.cell.key)
            .field("state", &*self.cell.state.lock())
            .finish()
    }
}
