//! Object mapper
//!
//! Typed records over the data store. An [`EntitySchema`] describes a mapped
//! type, a [`Mapper`] binds it to a store and a [`Session`], and each
//! [`Record`] tracks its own dirty and saveable state.
//!
//! ```rust
//! use schemaless_store::orm::{EntitySchema, Mapper, Session};
//! use schemaless_store::{DataStore, col, generate_id};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> schemaless_store::Result<()> {
//! let store = DataStore::in_memory(2)?;
//! store.define_index("index_user_id", ["user_id"], None)?;
//!
//! let schema = EntitySchema::builder(1)
//!     .persist(["user_id", "first_name", "last_name"])
//!     .id_field("user_id")
//!     .index("index_user_id", ["user_id"])
//!     .build()?;
//! let session = Session::new();
//! let users = Mapper::new(store, session.clone(), schema)?;
//!
//! let user_id = generate_id();
//! let user = users.create();
//! user.set("user_id", user_id).set("first_name", "evan").set("last_name", "klitzke");
//! assert!(user.saveable());
//!
//! session.save().await?;
//! assert!(!user.is_dirty());
//! assert!(users.get(&[col("user_id").equals(user_id)]).await?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod mapper;
pub mod record;
pub mod schema;
pub mod session;

pub use mapper::Mapper;
pub use record::{LifecycleState, Record};
pub use schema::{EntitySchema, EntitySchemaBuilder, IndexBinding};
pub use session::Session;
