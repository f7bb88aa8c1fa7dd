//! Bulk operation model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use merx_core::EntityKind;

/// Default records per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default concurrently processed chunks.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// What a bulk run does to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Create records (or replace existing ones with the same key).
    Import,
    /// Update existing records; missing targets fail per record.
    Update,
    /// Delete existing records.
    Delete,
    /// Read the store out into a report; never mutates.
    Export,
}

impl OperationType {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Import => "import",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
            OperationType::Export => "export",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "import" => Ok(OperationType::Import),
            "update" => Ok(OperationType::Update),
            "delete" => Ok(OperationType::Delete),
            "export" => Ok(OperationType::Export),
            _ => Err(format!("Unknown operation type: {s}")),
        }
    }
}

/// Lifecycle status of a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkStatus {
    /// Created, not yet picked up.
    Pending,
    /// Chunks are being processed.
    Running,
    /// Finished with zero failures.
    Completed,
    /// Finished with some failures, no rollback.
    CompletedWithErrors,
    /// Aborted by an irrecoverable error.
    Failed,
    /// A failure triggered rollback and it ran.
    RolledBack,
    /// Cancelled cooperatively.
    Cancelled,
}

impl BulkStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkStatus::Pending => "pending",
            BulkStatus::Running => "running",
            BulkStatus::Completed => "completed",
            BulkStatus::CompletedWithErrors => "completed_with_errors",
            BulkStatus::Failed => "failed",
            BulkStatus::RolledBack => "rolled_back",
            BulkStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BulkStatus::Pending | BulkStatus::Running)
    }
}

impl fmt::Display for BulkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BulkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BulkStatus::Pending),
            "running" => Ok(BulkStatus::Running),
            "completed" => Ok(BulkStatus::Completed),
            "completed_with_errors" => Ok(BulkStatus::CompletedWithErrors),
            "failed" => Ok(BulkStatus::Failed),
            "rolled_back" => Ok(BulkStatus::RolledBack),
            "cancelled" => Ok(BulkStatus::Cancelled),
            _ => Err(format!("Unknown bulk status: {s}")),
        }
    }
}

/// Per-record outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Not yet attempted.
    Pending,
    /// Applied (or validated, in validate-only mode).
    Success,
    /// Validation or write failed.
    Failed,
    /// Never attempted (halted intake, cancellation) or skipped.
    Skipped,
    /// Applied, then restored during rollback.
    RolledBack,
}

impl RecordStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Success => "success",
            RecordStatus::Failed => "failed",
            RecordStatus::Skipped => "skipped",
            RecordStatus::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What was done to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    /// Nothing yet.
    None,
    /// A new record was created.
    Created,
    /// An existing record was updated.
    Updated,
    /// A record was deleted.
    Deleted,
    /// Validate-only verdict.
    Validated,
}

impl RecordAction {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordAction::None => "none",
            RecordAction::Created => "created",
            RecordAction::Updated => "updated",
            RecordAction::Deleted => "deleted",
            RecordAction::Validated => "validated",
        }
    }
}

impl fmt::Display for RecordAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One parsed input record, in file order.
#[derive(Debug, Clone)]
pub struct BulkRecord {
    /// 0-based position in the input file.
    pub index: usize,
    /// Attribute payload mapped from the file's columns.
    pub attributes: serde_json::Value,
}

/// Options for one bulk run.
#[derive(Debug, Clone)]
pub struct BulkOptions {
    /// What the run does.
    pub operation_type: OperationType,
    /// Entity kind the records belong to.
    pub entity: EntityKind,
    /// Validate every record but apply nothing.
    pub validate_only: bool,
    /// On the first failure, halt intake and roll back prior successes.
    pub rollback_on_error: bool,
    /// Records per chunk.
    pub chunk_size: usize,
    /// Chunks processed concurrently.
    pub max_concurrent: usize,
}

impl BulkOptions {
    /// Create options with engine defaults.
    #[must_use]
    pub fn new(operation_type: OperationType, entity: EntityKind) -> Self {
        Self {
            operation_type,
            entity,
            validate_only: false,
            rollback_on_error: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    /// Enable validate-only mode.
    #[must_use]
    pub fn validate_only(mut self) -> Self {
        self.validate_only = true;
        self
    }

    /// Enable rollback on error.
    #[must_use]
    pub fn rollback_on_error(mut self) -> Self {
        self.rollback_on_error = true;
        self
    }

    /// Set the chunk size.
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Set the chunk concurrency.
    #[must_use]
    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }
}

/// One bulk import/update/delete/export run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperation {
    /// Operation id.
    pub id: Uuid,
    /// Owning organization.
    pub org_id: Uuid,
    /// What the run does.
    pub operation_type: OperationType,
    /// Entity kind.
    pub entity: EntityKind,
    /// Lifecycle status.
    pub status: BulkStatus,
    /// Records per chunk.
    pub chunk_size: usize,
    /// Chunks processed concurrently.
    pub max_concurrent: usize,
    /// Total input records.
    pub total_records: usize,
    /// Records applied (or validated) successfully.
    pub successful_records: usize,
    /// Records that failed.
    pub failed_records: usize,
    /// Validate-only flag.
    pub validate_only: bool,
    /// Rollback-on-error flag.
    pub rollback_on_error: bool,
    /// Warnings surfaced to the caller (e.g. unrollbackable deletes).
    pub warnings: Vec<String>,
    /// Submitting user, when known.
    pub created_by: Option<Uuid>,
    /// When the operation was submitted.
    pub created_at: DateTime<Utc>,
    /// When the operation was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl BulkOperation {
    /// Create a pending operation.
    #[must_use]
    pub fn new(
        org_id: Uuid,
        options: &BulkOptions,
        total_records: usize,
        created_by: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            org_id,
            operation_type: options.operation_type,
            entity: options.entity,
            status: BulkStatus::Pending,
            chunk_size: options.chunk_size,
            max_concurrent: options.max_concurrent,
            total_records,
            successful_records: 0,
            failed_records: 0,
            validate_only: options.validate_only,
            rollback_on_error: options.rollback_on_error,
            warnings: Vec::new(),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One row-level outcome within a bulk operation.
///
/// Append-only: written once when the record is processed; only the
/// rollback pass may later flip its status to `RolledBack`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperationRecord {
    /// 0-based input record index.
    pub index: usize,
    /// Internal store id the record touched, once known.
    pub record_id: Option<String>,
    /// What was done.
    pub action: RecordAction,
    /// Outcome status.
    pub status: RecordStatus,
    /// Error text for failed records.
    pub error: Option<String>,
    /// When the record was processed.
    pub processed_at: Option<DateTime<Utc>>,
    /// Pre-operation value, captured for rollback. `None` for creates.
    pub before: Option<serde_json::Value>,
    /// Post-operation value.
    pub after: Option<serde_json::Value>,
}

impl BulkOperationRecord {
    /// Create a pending record for the given input index.
    #[must_use]
    pub fn pending(index: usize) -> Self {
        Self {
            index,
            record_id: None,
            action: RecordAction::None,
            status: RecordStatus::Pending,
            error: None,
            processed_at: None,
            before: None,
            after: None,
        }
    }
}
