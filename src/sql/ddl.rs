//! DDL generation for shard provisioning
//!
//! The store never creates tables itself. These statements describe the
//! layout the Postgres backend expects, for whoever provisions the shards.

use crate::backend::postgres::ENTITY_ID_COLUMN;
use crate::config::StoreConfig;
use crate::index::IndexDefinition;
use crate::sql::sanitize::quote_identifier;

/// DDL generator for entity and index tables
pub struct DdlGenerator<'a> {
    config: &'a StoreConfig,
}

impl<'a> DdlGenerator<'a> {
    /// Create a new DDL generator with the given configuration
    pub fn new(config: &'a StoreConfig) -> Self {
        Self { config }
    }

    /// CREATE TABLE for the primary entities table
    pub fn generate_entities_table(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id TEXT PRIMARY KEY, \
             tag INTEGER NOT NULL, \
             fields JSONB NOT NULL, \
             created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
             updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
            quote_identifier(&self.config.entities_table)
        )
    }

    /// CREATE TABLE for one index, keyed by its columns plus the entity id
    pub fn generate_index_table(&self, index: &IndexDefinition) -> String {
        let table = self.config.index_table(&index.name);

        let mut column_defs: Vec<String> = index
            .columns
            .iter()
            .map(|c| format!("{} JSONB NOT NULL", quote_identifier(c)))
            .collect();
        column_defs.push(format!("{} TEXT NOT NULL", ENTITY_ID_COLUMN));

        let mut key: Vec<String> = index.columns.iter().map(|c| quote_identifier(c)).collect();
        key.push(ENTITY_ID_COLUMN.to_string());

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}))",
            quote_identifier(&table),
            column_defs.join(", "),
            key.join(", ")
        )
    }

    /// Every statement needed to provision one shard
    pub fn generate_all(&self, indexes: &[IndexDefinition]) -> Vec<String> {
        let mut statements = vec![self.generate_entities_table()];
        for index in indexes {
            statements.push(self.generate_index_table(index));
        }
        statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_name_index() -> IndexDefinition {
        IndexDefinition::new("index_user_name", ["first_name", "last_name"])
    }

    #[test]
    fn test_entities_table() {
        let config = StoreConfig::local(1);
        let sql = DdlGenerator::new(&config).generate_entities_table();

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"entities\""));
        assert!(sql.contains("id TEXT PRIMARY KEY"));
        assert!(sql.contains("fields JSONB NOT NULL"));
    }

    #[test]
    fn test_entities_table_custom_name() {
        let config = StoreConfig::builder().shard("a").entities_table("records").build();
        let sql = DdlGenerator::new(&config).generate_entities_table();
        assert!(sql.contains("\"records\""));
    }

    #[test]
    fn test_index_table() {
        let config = StoreConfig::local(1);
        let sql = DdlGenerator::new(&config).generate_index_table(&user_name_index());

        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"index_user_name\" (\"first_name\" JSONB NOT NULL, \
             \"last_name\" JSONB NOT NULL, entity_id TEXT NOT NULL, \
             PRIMARY KEY (\"first_name\", \"last_name\", entity_id))"
        );
    }

    #[test]
    fn test_index_table_gets_prefix() {
        let config = StoreConfig::local(1);
        let index = IndexDefinition::new("foo", ["bar"]);
        let sql = DdlGenerator::new(&config).generate_index_table(&index);
        assert!(sql.contains("\"index_foo\""));
    }

    #[test]
    fn test_generate_all() {
        let config = StoreConfig::local(1);
        let statements = DdlGenerator::new(&config)
            .generate_all(&[user_name_index(), IndexDefinition::new("index_foo", ["bar"])]);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].contains("\"entities\""));
        assert!(statements[1].contains("\"index_user_name\""));
        assert!(statements[2].contains("\"index_foo\""));
        assert!(statements.iter().all(|s| s.starts_with("CREATE TABLE IF NOT EXISTS")));
    }
}
