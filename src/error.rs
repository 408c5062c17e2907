//! Error types for entity store operations

use thiserror::Error;

use crate::id::EntityId;

/// Errors that can occur during entity store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No suitable index for columns [{}]", columns.join(", "))]
    NoSuitableIndex { columns: Vec<String> },

    /// A write reached some tables but not others. Retrying the same
    /// operation reconverges the index state.
    #[error("Partial write for entity {entity_id} at {stage}: {source}")]
    PartialWrite {
        entity_id: EntityId,
        stage: String,
        #[source]
        source: Box<StoreError>,
    },

    /// A session flush stopped at the first failing instance.
    #[error("Session flush stopped after {} saved instance(s): {source}", saved.len())]
    SessionFlush {
        saved: Vec<EntityId>,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn no_suitable_index<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::NoSuitableIndex {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn partial_write(entity_id: EntityId, stage: impl Into<String>, source: StoreError) -> Self {
        Self::PartialWrite {
            entity_id,
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// Whether repeating the failed call may succeed.
    ///
    /// Configuration, argument and planning errors are caller mistakes and
    /// fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PartialWrite { .. } | Self::Backend(_) | Self::Sql(_) => true,
            Self::SessionFlush { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_suitable_index_message_lists_columns() {
        let err = StoreError::no_suitable_index(["first_name", "age"]);
        assert_eq!(
            err.to_string(),
            "No suitable index for columns [first_name, age]"
        );
    }

    #[test]
    fn test_partial_write_is_retryable() {
        let id = EntityId::generate();
        let err = StoreError::partial_write(id, "index_user_id", StoreError::backend("down"));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("index_user_id"));
        assert!(err.to_string().contains("down"));
    }

    #[test]
    fn test_programming_errors_are_not_retryable() {
        assert!(!StoreError::no_suitable_index(["x"]).is_retryable());
        assert!(!StoreError::invalid_argument("both").is_retryable());
        assert!(!StoreError::configuration("no shards").is_retryable());
        assert!(!StoreError::not_found("x").is_retryable());
    }

    #[test]
    fn test_session_flush_inherits_retryability() {
        let err = StoreError::SessionFlush {
            saved: vec![EntityId::generate()],
            source: Box::new(StoreError::backend("timeout")),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("1 saved instance"));
    }
}
