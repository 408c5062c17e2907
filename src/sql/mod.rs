//! SQL utilities
//!
//! Identifier sanitization and provisioning DDL for the Postgres backend.

pub mod ddl;
pub mod sanitize;

pub use ddl::DdlGenerator;
pub use sanitize::{POSTGRES_RESERVED_WORDS, quote_identifier, validate_identifier};
