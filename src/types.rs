//! Core data types for the entity store
//!
//! Includes scalar field values, schema-less field maps and persisted entities.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::id::EntityId;

/// Opaque type discriminator stamped on an entity at creation
pub type Tag = i32;

// ============================================================================
// Scalar Values
// ============================================================================

/// A single field value
///
/// Serialized untagged, so field maps read and write as plain JSON objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Stable byte form used as a shard routing key
    pub(crate) fn routing_key(&self) -> Vec<u8> {
        match self {
            Value::Boolean(b) => vec![b'b', *b as u8],
            Value::Integer(i) => {
                let mut key = vec![b'i'];
                key.extend_from_slice(&i.to_be_bytes());
                key
            }
            Value::Float(f) => {
                let mut key = vec![b'f'];
                key.extend_from_slice(&canonical_float(*f).to_bits().to_be_bytes());
                key
            }
            Value::String(s) => {
                let mut key = vec![b's'];
                key.extend_from_slice(s.as_bytes());
                key
            }
        }
    }

    fn from_json(name: &str, value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Bool(b) => Ok(Value::Boolean(b)),
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Integer)
                .or_else(|| n.as_f64().map(Value::from))
                .ok_or_else(|| {
                    StoreError::invalid_argument(format!(
                        "Field '{}' has an out of range number: {}",
                        name, n
                    ))
                }),
            other => Err(StoreError::invalid_argument(format!(
                "Field '{}' must be a scalar, got {}",
                name, other
            ))),
        }
    }
}

/// `-0.0` compares equal to `0.0`, so both must hash and store the same way
fn canonical_float(f: f64) -> f64 {
    if f == 0.0 { 0.0 } else { f }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(canonical_float(f))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::String(id.to_string())
    }
}

// ============================================================================
// Field Maps
// ============================================================================

/// Schema-less field map, ordered by field name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reject NaN and infinite floats
    ///
    /// NaN never equals itself, so an index row holding one could never be
    /// matched, deduplicated or retracted.
    pub fn check_finite(&self) -> Result<()> {
        for (name, value) in &self.0 {
            match value {
                Value::Float(f) if !f.is_finite() => {
                    return Err(StoreError::invalid_argument(format!(
                        "Field '{}' is not a finite number: {}",
                        name, f
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Same map with every `-0.0` stored as `0.0`
    pub(crate) fn canonical(self) -> Self {
        self.into_iter()
            .map(|(name, value)| match value {
                Value::Float(f) => (name, Value::Float(canonical_float(f))),
                other => (name, other),
            })
            .collect()
    }

    /// Copy of this map restricted to `names`; absent names are skipped
    pub fn project<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Fields {
        names
            .into_iter()
            .filter_map(|name| self.0.get(name).map(|v| (name.to_string(), v.clone())))
            .collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Fields {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl TryFrom<serde_json::Value> for Fields {
    type Error = StoreError;

    /// Accepts a JSON object of scalars. `null` members are dropped, since an
    /// absent field and a missing value mean the same thing here.
    fn try_from(value: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = value else {
            return Err(StoreError::invalid_argument("Fields must be a JSON object"));
        };
        let mut fields = Fields::new();
        for (name, value) in map {
            if value.is_null() {
                continue;
            }
            let value = Value::from_json(&name, value)?;
            fields.0.insert(name, value);
        }
        Ok(fields)
    }
}

impl Index<&str> for Fields {
    type Output = Value;

    /// Panics if the field is absent, like `HashMap` indexing. Use
    /// [`Fields::get`] for fields that may be missing.
    fn index(&self, name: &str) -> &Value {
        &self.0[name]
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A persisted schema-less record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub tag: Tag,
    pub fields: Fields,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Create a new entity stamped with the current time
    pub fn new(id: EntityId, tag: Tag, fields: Fields) -> Self {
        let now = Utc::now();
        Self {
            id,
            tag,
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// Field access by name; `None` when absent
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl Index<&str> for Entity {
    type Output = Value;

    /// Panics if the field is absent. Use [`Entity::get`] for fields that may
    /// be missing.
    fn index(&self, name: &str) -> &Value {
        &self.fields[name]
    }
}
