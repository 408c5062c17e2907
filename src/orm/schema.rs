//! Entity schema descriptors
//!
//! Describes one mapped entity type: its tag, the fields it persists, its
//! application-level identity field and the store indexes it may query.

use crate::error::{Result, StoreError};
use crate::query::{Clause, covers, referenced_columns};
use crate::types::{Fields, Tag};

/// A store index that a mapped type may query through
#[derive(Debug, Clone, PartialEq)]
pub struct IndexBinding {
    pub name: String,
    pub columns: Vec<String>,
}

/// Mapped entity type description
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    /// Tag stamped on every saved entity
    pub tag: Tag,
    /// Fields written on save; all must be set for a record to be saveable
    pub persist: Vec<String>,
    /// Application-level identity field, one of `persist`
    pub id_field: String,
    /// Index bindings, checked against the store when a mapper is built
    pub indexes: Vec<IndexBinding>,
}

impl EntitySchema {
    pub fn builder(tag: Tag) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            tag,
            persist: Vec::new(),
            id_field: None,
            indexes: Vec::new(),
        }
    }

    pub fn is_persisted(&self, name: &str) -> bool {
        self.persist.iter().any(|p| p == name)
    }

    /// Every persisted field has a value
    pub fn saveable(&self, fields: &Fields) -> bool {
        self.persist.iter().all(|p| fields.contains(p))
    }

    /// Number of persisted fields that have a value
    pub fn persisted_count(&self, fields: &Fields) -> usize {
        self.persist.iter().filter(|p| fields.contains(p)).count()
    }

    /// The persisted subset of `fields`
    pub fn persisted(&self, fields: &Fields) -> Fields {
        fields.project(self.persist.iter().map(String::as_str))
    }

    /// First binding whose columns cover the clauses
    pub fn binding_for(&self, clauses: &[Clause]) -> Result<&IndexBinding> {
        let columns = referenced_columns(clauses);
        self.indexes
            .iter()
            .find(|binding| covers(&binding.columns, &columns))
            .ok_or_else(|| StoreError::no_suitable_index(columns))
    }
}

/// Builder for EntitySchema
#[derive(Debug)]
pub struct EntitySchemaBuilder {
    tag: Tag,
    persist: Vec<String>,
    id_field: Option<String>,
    indexes: Vec<IndexBinding>,
}

impl EntitySchemaBuilder {
    pub fn persist<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.persist.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn id_field(mut self, name: impl Into<String>) -> Self {
        self.id_field = Some(name.into());
        self
    }

    /// Bind an already-registered store index
    pub fn index<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.push(IndexBinding {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn build(self) -> Result<EntitySchema> {
        if self.persist.is_empty() {
            return Err(StoreError::configuration("Schema must persist at least one field"));
        }
        let id_field = self
            .id_field
            .ok_or_else(|| StoreError::configuration("Schema requires an id field"))?;
        if !self.persist.contains(&id_field) {
            return Err(StoreError::configuration(format!(
                "Id field '{}' must be one of the persisted fields",
                id_field
            )));
        }
        Ok(EntitySchema {
            tag: self.tag,
            persist: self.persist,
            id_field,
            indexes: self.indexes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::col;

    fn user() -> EntitySchema {
        EntitySchema::builder(1)
            .persist(["user_id", "first_name", "last_name"])
            .id_field("user_id")
            .index("index_user_id", ["user_id"])
            .index("index_user_name", ["first_name", "last_name"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_id_field_in_persist() {
        let err = EntitySchema::builder(1)
            .persist(["first_name"])
            .id_field("user_id")
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));

        assert!(EntitySchema::builder(1).persist(["a"]).build().is_err());
        assert!(EntitySchema::builder(1).id_field("a").build().is_err());
    }

    #[test]
    fn test_saveable() {
        let schema = user();
        let partial = Fields::new().with("user_id", "u").with("first_name", "evan");
        assert!(!schema.saveable(&partial));
        assert_eq!(schema.persisted_count(&partial), 2);
        assert!(schema.saveable(&partial.with("last_name", "klitzke")));
    }

    #[test]
    fn test_persisted_drops_local_fields() {
        let schema = user();
        let fields = Fields::new().with("user_id", "u").with("scratch", 1);
        assert_eq!(schema.persisted(&fields), Fields::new().with("user_id", "u"));
    }

    #[test]
    fn test_binding_for() {
        let schema = user();
        assert_eq!(
            schema.binding_for(&[col("user_id").equals("u")]).unwrap().name,
            "index_user_id"
        );
        assert_eq!(
            schema
                .binding_for(&[col("last_name").equals("b"), col("first_name").equals("a")])
                .unwrap()
                .name,
            "index_user_name"
        );
        assert!(matches!(
            schema.binding_for(&[col("last_name").equals("b")]),
            Err(StoreError::NoSuitableIndex { .. })
        ));
    }
}
