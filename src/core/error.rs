use crate::core::types::{ObjectId, RelationEndPointId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelationError {
    #[error("Index out of range: {index} (count {count})")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Out of sync: {0}")]
    OutOfSync(String),

    #[error("Mandatory relation not set: {0}")]
    MandatoryRelationNotSet(String),

    #[error("Object '{0}' has been deleted")]
    ObjectDeleted(ObjectId),

    #[error("Object '{0}' not found")]
    ObjectNotFound(ObjectId),

    #[error("Relation end-point '{0}' not found")]
    EndPointNotFound(RelationEndPointId),

    #[error("Load error: {0}")]
    LoadError(String),

    #[error("Operation vetoed: {0}")]
    Vetoed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, RelationError>;

impl RelationError {
    /// Shorthand for the most common precondition failure.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// Returns true for consistency violations that the caller can repair with the sync service.
    pub fn is_out_of_sync(&self) -> bool {
        matches!(self, Self::OutOfSync(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for RelationError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for RelationError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}
