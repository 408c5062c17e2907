//! Predicate construction and index query planning
//!
//! A query is a conjunction of [`Clause`]s. The planner accepts it only when
//! the columns it references are exactly a leading prefix of some index's
//! column list; there is no fallback scan. Each column's clauses collapse to
//! a set of permitted values, and the plan looks up every combination of
//! those values as an exact key prefix.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backend::Backend;
use crate::entity_store::EntityStore;
use crate::error::{Result, StoreError};
use crate::index::{IndexDefinition, IndexManager};
use crate::types::{Entity, Value};

// ============================================================================
// Clauses
// ============================================================================

/// One condition on one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Clause {
    Equals { column: String, value: Value },
    In { column: String, values: Vec<Value> },
}

impl Clause {
    pub fn column(&self) -> &str {
        match self {
            Clause::Equals { column, .. } | Clause::In { column, .. } => column,
        }
    }

    /// Values this clause admits, deduplicated, in first-seen order
    fn admitted(&self) -> Vec<Value> {
        match self {
            Clause::Equals { value, .. } => vec![value.clone()],
            Clause::In { values, .. } => {
                let mut unique: Vec<Value> = Vec::with_capacity(values.len());
                for value in values {
                    if !unique.contains(value) {
                        unique.push(value.clone());
                    }
                }
                unique
            }
        }
    }

    /// Whether an entity's fields satisfy this clause
    pub fn accepts(&self, entity: &Entity) -> bool {
        match (self, entity.get(self.column())) {
            (Clause::Equals { value, .. }, Some(actual)) => actual == value,
            (Clause::In { values, .. }, Some(actual)) => values.contains(actual),
            (_, None) => false,
        }
    }
}

/// Column reference used to build clauses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column(String);

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// `column == value`
    pub fn equals(&self, value: impl Into<Value>) -> Clause {
        Clause::Equals {
            column: self.0.clone(),
            value: value.into(),
        }
    }

    /// `column IN (values...)`
    pub fn in_values<I, V>(&self, values: I) -> Clause
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Clause::In {
            column: self.0.clone(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Shorthand for [`Column::new`]
pub fn col(name: impl Into<String>) -> Column {
    Column::new(name)
}

/// Distinct columns referenced by `clauses`, in first-seen order
pub fn referenced_columns(clauses: &[Clause]) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for clause in clauses {
        if !columns.contains(&clause.column()) {
            columns.push(clause.column());
        }
    }
    columns
}

/// Whether an index over `index_columns` can serve a query over exactly
/// `columns`
///
/// True when the columns are, as a set, the first `columns.len()` index
/// columns.
pub fn covers(index_columns: &[String], columns: &[&str]) -> bool {
    !columns.is_empty()
        && columns.len() <= index_columns.len()
        && index_columns[..columns.len()]
            .iter()
            .all(|c| columns.contains(&c.as_str()))
}

// ============================================================================
// Planning
// ============================================================================

/// Executable lookup against one index
#[derive(Debug, Clone)]
pub struct QueryPlan<'a> {
    index: &'a IndexDefinition,
    clauses: &'a [Clause],
    /// Exact key prefixes to look up, one per value combination
    keys: Vec<Vec<(String, Value)>>,
}

impl<'a> QueryPlan<'a> {
    /// Plan `clauses` against a single index
    pub fn new(index: &'a IndexDefinition, clauses: &'a [Clause]) -> Result<Self> {
        let columns = referenced_columns(clauses);
        if !covers(&index.columns, &columns) {
            return Err(StoreError::no_suitable_index(columns));
        }

        let mut keys: Vec<Vec<(String, Value)>> = vec![Vec::new()];
        for column in &index.columns[..columns.len()] {
            let mut admitted: Option<Vec<Value>> = None;
            for clause in clauses.iter().filter(|c| c.column() == column.as_str()) {
                let values = clause.admitted();
                admitted = Some(match admitted {
                    None => values,
                    Some(previous) => previous.into_iter().filter(|v| values.contains(v)).collect(),
                });
            }
            let admitted = admitted.unwrap_or_default();

            keys = keys
                .into_iter()
                .flat_map(|prefix| {
                    admitted.iter().map(move |value| {
                        let mut key = prefix.clone();
                        key.push((column.clone(), value.clone()));
                        key
                    })
                })
                .collect();
        }

        Ok(Self {
            index,
            clauses,
            keys,
        })
    }

    /// Pick the index for `clauses` among `candidates`
    ///
    /// Prefers the index whose column list is exactly the referenced set,
    /// then the shortest covering index, then name order.
    pub fn select<'d>(
        candidates: &'d [std::sync::Arc<IndexDefinition>],
        clauses: &[Clause],
    ) -> Result<&'d IndexDefinition> {
        let columns = referenced_columns(clauses);
        candidates
            .iter()
            .filter(|index| covers(&index.columns, &columns))
            .min_by(|a, b| {
                a.columns
                    .len()
                    .cmp(&b.columns.len())
                    .then_with(|| a.name.cmp(&b.name))
            })
            .map(|index| &**index)
            .ok_or_else(|| StoreError::no_suitable_index(columns))
    }

    pub fn index(&self) -> &IndexDefinition {
        self.index
    }

    pub fn keys(&self) -> &[Vec<(String, Value)>] {
        &self.keys
    }

    /// Whether a hydrated entity still matches the index and every clause
    ///
    /// Filters out rows left behind by an interrupted write.
    pub fn accepts(&self, entity: &Entity) -> bool {
        self.index.is_eligible(&entity.fields) && self.clauses.iter().all(|c| c.accepts(entity))
    }

    /// Run the plan: look up every key, union the ids, hydrate
    ///
    /// Results are unique per entity and ordered by entity id.
    pub async fn execute<B: Backend>(
        &self,
        indexes: &IndexManager<B>,
        entities: &EntityStore<B>,
    ) -> Result<Vec<Entity>> {
        let mut ids = BTreeSet::new();
        for key in &self.keys {
            ids.extend(indexes.lookup(self.index, key).await?);
        }

        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            match entities.get(&id).await? {
                Some(entity) if self.accepts(&entity) => rows.push(entity),
                Some(_) | None => {
                    warn!(index = %self.index.name, entity_id = %id, "Skipping stale index row");
                }
            }
        }
        Ok(rows)
    }
}
