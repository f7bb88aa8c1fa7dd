//! Sync error types.

use thiserror::Error;

use merx_connector::ConnectorError;
use merx_core::StoreError;

/// Errors that can occur during synchronization.
///
/// Mapping and validation variants are per-record: the orchestrator
/// captures them into the job's error list and keeps going. Connector
/// variants classified fatal abort the whole job.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Connector error.
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No mapping found for an external record.
    #[error("no mapping for {key}: {message}")]
    Mapping { key: String, message: String },

    /// Record failed validation.
    #[error("validation failed for {key}: {message}")]
    Validation { key: String, message: String },

    /// A mapping already exists for the pair.
    #[error("duplicate mapping for internal id '{internal_id}' on system '{external_system}'")]
    DuplicateMapping {
        internal_id: String,
        external_system: String,
    },

    /// Malformed webhook payload.
    #[error("invalid webhook payload: {message}")]
    InvalidWebhook { message: String },

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Create a mapping error.
    pub fn mapping(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a duplicate mapping error.
    pub fn duplicate_mapping(
        internal_id: impl Into<String>,
        external_system: impl Into<String>,
    ) -> Self {
        Self::DuplicateMapping {
            internal_id: internal_id.into(),
            external_system: external_system.into(),
        }
    }

    /// Create an invalid webhook error.
    pub fn invalid_webhook(message: impl Into<String>) -> Self {
        Self::InvalidWebhook {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error must abort the enclosing job.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Connector(e) if e.is_fatal())
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
