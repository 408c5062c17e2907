//! Configuration for DataStore
//!
//! Provides a builder pattern for configuring shard addresses, credentials
//! and table naming.

use crate::error::{Result, StoreError};
use crate::sql::sanitize::validate_identifier;

/// Configuration for the data store
///
/// The shard list feeds the shard router; credentials and database name are
/// passed through to the storage backend unchanged.
#[derive(Clone)]
pub struct StoreConfig {
    /// Shard addresses (`host:port`), in routing order
    pub shards: Vec<String>,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Database name, identical on every shard
    pub database: String,
    /// Name of the primary entities table (default: "entities")
    pub entities_table: String,
    /// Prefix of per-index tables (default: "index_")
    pub index_table_prefix: String,
}

impl StoreConfig {
    /// Create a new configuration builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::new()
    }

    /// Configuration with `count` anonymous shards, for in-process backends
    pub fn local(count: usize) -> Self {
        Self::builder()
            .shards((0..count).map(|i| format!("local-{}", i)))
            .build()
    }

    /// Table that holds rows of the given index
    ///
    /// Index names that already carry the prefix are used as-is, so an index
    /// named `index_user_id` maps to table `index_user_id`.
    pub fn index_table(&self, index_name: &str) -> String {
        if index_name.starts_with(&self.index_table_prefix) {
            index_name.to_string()
        } else {
            format!("{}{}", self.index_table_prefix, index_name)
        }
    }

    /// Postgres connection URL for one shard address
    pub fn connection_url(&self, address: &str) -> String {
        if self.user.is_empty() {
            format!("postgres://{}/{}", address, self.database)
        } else {
            format!(
                "postgres://{}:{}@{}/{}",
                self.user, self.password, address, self.database
            )
        }
    }

    /// Check the configuration before building a store on it
    pub fn validate(&self) -> Result<()> {
        if self.shards.is_empty() {
            return Err(StoreError::configuration("At least one shard is required"));
        }
        validate_identifier(&self.entities_table, &[]).map_err(StoreError::Configuration)?;
        validate_identifier(self.index_table_prefix.trim_end_matches('_'), &[])
            .map_err(StoreError::Configuration)?;
        Ok(())
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("shards", &self.shards)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("entities_table", &self.entities_table)
            .field("index_table_prefix", &self.index_table_prefix)
            .finish()
    }
}

/// Builder for StoreConfig
#[derive(Debug)]
pub struct StoreConfigBuilder {
    shards: Vec<String>,
    user: String,
    password: String,
    database: String,
    entities_table: String,
    index_table_prefix: String,
}

impl Default for StoreConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreConfigBuilder {
    pub fn new() -> Self {
        Self {
            shards: Vec::new(),
            user: String::new(),
            password: String::new(),
            database: String::new(),
            entities_table: "entities".to_string(),
            index_table_prefix: "index_".to_string(),
        }
    }

    /// Add one shard address
    pub fn shard(mut self, address: impl Into<String>) -> Self {
        self.shards.push(address.into());
        self
    }

    /// Add several shard addresses
    pub fn shards<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shards.extend(addresses.into_iter().map(Into::into));
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the entities table name (default: "entities")
    pub fn entities_table(mut self, name: impl Into<String>) -> Self {
        self.entities_table = name.into();
        self
    }

    /// Set the index table prefix (default: "index_")
    pub fn index_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.index_table_prefix = prefix.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> StoreConfig {
        StoreConfig {
            shards: self.shards,
            user: self.user,
            password: self.password,
            database: self.database,
            entities_table: self.entities_table,
            index_table_prefix: self.index_table_prefix,
        }
    }
}
