//! # schemaless-store
//!
//! A schema-less entity store sharded across backing databases, with derived
//! secondary indexes and a typed object mapper.
//!
//! Entities are opaque field maps identified by generated ids. Each entity
//! row lives on the shard its id routes to. Secondary indexes are separate
//! tables projecting a fixed column list out of every eligible entity, and
//! are reconciled on every write so equality and IN lookups can be served
//! without scanning.
//!
//! ## Features
//!
//! - **Schema-less entities**: any set of scalar fields, changing freely between writes
//! - **Sharding**: ids and index keys hash onto a fixed slot ring split across shards
//! - **Filtered indexes**: optional `match_on` conditions restrict which entities are indexed
//! - **Index planning**: queries must hit a leading prefix of some index; no full scans
//! - **Object mapper**: typed records with dirty tracking and buffered session flushes
//! - **Pluggable storage**: in-memory shards or PostgreSQL via sqlx
//!
//! ## Quick Start
//!
//! ```rust
//! use schemaless_store::{DataStore, Fields, Value, col, generate_id};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> schemaless_store::Result<()> {
//! let store = DataStore::in_memory(4)?;
//! let by_user = store.define_index("index_user_id", ["user_id"], None)?;
//!
//! let user_id = generate_id();
//! let entity = store
//!     .put(
//!         Fields::new()
//!             .with("user_id", user_id)
//!             .with("first_name", "evan")
//!             .with("last_name", "klitzke"),
//!     )
//!     .await?;
//!
//! let rows = by_user.query(&[col("user_id").equals(user_id)]).await?;
//! assert_eq!(rows.len(), 1);
//! assert_eq!(rows[0]["first_name"], Value::from("evan"));
//!
//! store.delete_entity(&entity).await?;
//! assert!(by_user.query(&[col("user_id").equals(user_id)]).await?.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! `entity["name"]` panics when the field is absent, like map indexing.
//! Entities are schema-less, so use [`Entity::get`] for any field that may be
//! missing:
//!
//! ```rust
//! use schemaless_store::{Entity, EntityId, Fields, Value};
//!
//! let entity = Entity::new(EntityId::generate(), 0, Fields::new().with("first_name", "evan"));
//! assert_eq!(entity.get("first_name"), Some(&Value::from("evan")));
//! assert_eq!(entity.get("last_name"), None);
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use schemaless_store::StoreConfig;
//!
//! let config = StoreConfig::builder()
//!     .shards(["db1:5432", "db2:5432"])
//!     .user("app")
//!     .password("secret")
//!     .database("app")
//!     .entities_table("entities")   // Default entities table name
//!     .index_table_prefix("index_") // Default index table prefix
//!     .build();
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Consistency
//!
//! An entity write and its index writes are separate operations that may
//! land on different shards. Stale index rows are retracted before the
//! entity row is overwritten and fresh rows are upserted after it. A failure
//! after any of those writes landed is [`StoreError::PartialWrite`];
//! repeating the put reconverges the indexes. Queries re-check hydrated entities against the
//! index and clauses, so rows left behind by an interrupted write are never
//! returned.

pub mod backend;
pub mod config;
pub mod entity_store;
pub mod error;
pub mod id;
pub mod index;
pub mod orm;
pub mod query;
pub mod shard;
pub mod sql;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use backend::{Backend, MemoryBackend, PostgresBackend};
pub use config::{StoreConfig, StoreConfigBuilder};
pub use entity_store::EntityStore;
pub use error::{Result, StoreError};
pub use id::{EntityId, generate_id};
pub use index::{IndexDefinition, IndexManager, IndexRow};
pub use query::{Clause, Column, QueryPlan, col};
pub use shard::{Shard, ShardRouter};
pub use store::{DataStore, Index, PutRequest};
pub use types::{Entity, Fields, Tag, Value};
