//! Sync job model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use merx_connector::SyncFilters;
use merx_core::EntityKind;

/// Direction of a sync run relative to the internal store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// External system is the source; the internal store the target.
    Pull,
    /// Internal store is the source; the external system the target.
    Push,
}

impl SyncDirection {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::Pull => "pull",
            SyncDirection::Push => "push",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pull" => Ok(SyncDirection::Pull),
            "push" => Ok(SyncDirection::Push),
            _ => Err(format!("Unknown sync direction: {s}")),
        }
    }
}

/// Lifecycle status of a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Created, not yet started.
    Pending,
    /// Orchestrator is consuming pages.
    InProgress,
    /// Finished with zero failed records.
    Completed,
    /// Finished, but some records failed.
    CompletedWithErrors,
    /// Aborted by a fatal error.
    Failed,
}

impl SyncStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::InProgress => "in_progress",
            SyncStatus::Completed => "completed",
            SyncStatus::CompletedWithErrors => "completed_with_errors",
            SyncStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::Completed | SyncStatus::CompletedWithErrors | SyncStatus::Failed
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SyncStatus::Pending),
            "in_progress" => Ok(SyncStatus::InProgress),
            "completed" => Ok(SyncStatus::Completed),
            "completed_with_errors" => Ok(SyncStatus::CompletedWithErrors),
            "failed" => Ok(SyncStatus::Failed),
            _ => Err(format!("Unknown sync status: {s}")),
        }
    }
}

/// One synchronization run.
///
/// Created when a sync is triggered, mutated by the orchestrator as
/// pages are consumed (cursor, status, timestamps), terminal on
/// completion or fatal error. Owned exclusively by the orchestrator
/// while running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    /// Job id.
    pub id: Uuid,
    /// Owning organization.
    pub org_id: Uuid,
    /// Entity kind being synchronized.
    pub entity: EntityKind,
    /// System records are read from.
    pub source_system: String,
    /// System records are written to.
    pub target_system: String,
    /// Direction relative to the internal store.
    pub direction: SyncDirection,
    /// Lifecycle status.
    pub status: SyncStatus,
    /// Optional narrowing filters.
    pub filters: SyncFilters,
    /// Pagination state, updated after every consumed page.
    pub cursor: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl SyncJob {
    /// Create a pull job: `system` -> internal store.
    pub fn pull(org_id: Uuid, entity: EntityKind, system: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            org_id,
            entity,
            source_system: system.into(),
            target_system: crate::conflict::INTERNAL_SYSTEM.to_string(),
            direction: SyncDirection::Pull,
            status: SyncStatus::Pending,
            filters: SyncFilters::none(),
            cursor: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a push job: internal store -> `system`.
    pub fn push(org_id: Uuid, entity: EntityKind, system: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            org_id,
            entity,
            source_system: crate::conflict::INTERNAL_SYSTEM.to_string(),
            target_system: system.into(),
            direction: SyncDirection::Push,
            status: SyncStatus::Pending,
            filters: SyncFilters::none(),
            cursor: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set filters.
    #[must_use]
    pub fn with_filters(mut self, filters: SyncFilters) -> Self {
        self.filters = filters;
        self
    }

    /// The external system this job talks to, regardless of direction.
    #[must_use]
    pub fn external_system(&self) -> &str {
        match self.direction {
            SyncDirection::Pull => &self.source_system,
            SyncDirection::Push => &self.target_system,
        }
    }

    /// Transition to in-progress.
    pub fn start(&mut self) {
        self.status = SyncStatus::InProgress;
        self.touch();
    }

    /// Transition to a completed status based on the failure count.
    pub fn complete(&mut self, records_failed: u64) {
        self.status = if records_failed > 0 {
            SyncStatus::CompletedWithErrors
        } else {
            SyncStatus::Completed
        };
        self.touch();
    }

    /// Transition to failed.
    pub fn fail(&mut self) {
        self.status = SyncStatus::Failed;
        self.touch();
    }

    /// Record a mutation timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
