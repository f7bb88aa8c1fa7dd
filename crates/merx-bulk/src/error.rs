//! Bulk engine error types.

use thiserror::Error;
use uuid::Uuid;

use merx_core::StoreError;

/// Errors that can occur in the bulk operations engine.
#[derive(Debug, Error)]
pub enum BulkError {
    /// No operation with the given id.
    #[error("unknown operation: {id}")]
    UnknownOperation { id: Uuid },

    /// The operation is not in a state that allows the action.
    #[error("operation {id} is {status}; cannot {action}")]
    InvalidState {
        id: Uuid,
        status: String,
        action: String,
    },

    /// Invalid engine options.
    #[error("invalid options: {message}")]
    InvalidOptions { message: String },

    /// The input file could not be parsed at all.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// CSV layer error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BulkError {
    /// Create an unknown-operation error.
    #[must_use]
    pub fn unknown(id: Uuid) -> Self {
        Self::UnknownOperation { id }
    }

    /// Create an invalid-state error.
    pub fn invalid_state(id: Uuid, status: impl Into<String>, action: impl Into<String>) -> Self {
        Self::InvalidState {
            id,
            status: status.into(),
            action: action.into(),
        }
    }

    /// Create an invalid-options error.
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Result type for bulk operations.
pub type BulkResult<T> = Result<T, BulkError>;
