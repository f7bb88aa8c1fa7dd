//! Store error types.

use thiserror::Error;

use crate::entity::EntityKind;

/// Errors that can occur in the internal store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    /// The store rejected a mutation.
    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Invalid pagination cursor.
    #[error("invalid cursor: {cursor}")]
    InvalidCursor { cursor: String },

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create a not-found error.
    pub fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create a constraint violation error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
        }
    }

    /// Create an invalid cursor error.
    pub fn invalid_cursor(cursor: impl Into<String>) -> Self {
        Self::InvalidCursor {
            cursor: cursor.into(),
        }
    }

    /// Check if this error means the record simply does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
