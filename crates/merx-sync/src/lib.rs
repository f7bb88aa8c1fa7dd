//! # Merx Sync Engine
//!
//! Drives synchronization between the internal store and external
//! commerce/ERP platforms:
//!
//! - [`SyncJob`] — one synchronization run (pull or push)
//! - [`MappingStore`] — durable cross-references between internal ids
//!   and external ids, one per (internal id, external system)
//! - Conflict detection ([`conflict`]) and resolution ([`resolver`]):
//!   ordered custom rules first, per-type default strategies second,
//!   manual review as the unconditional fallback
//! - [`SyncOrchestrator`] — paginated extraction, mapping, validation,
//!   conflict handling, store writes, progress reporting
//! - [`WebhookHandler`] — single-record ingestion through the same
//!   pipeline
//!
//! All collaborators are injected at construction (`Arc<dyn …>`);
//! nothing in this crate owns process-wide state.

pub mod conflict;
pub mod error;
pub mod job;
pub mod mapping;
pub mod orchestrator;
pub mod resolver;
pub mod throttle;
pub mod webhook;

pub use conflict::{
    changed_fields, detect_value_conflict, ConflictSource, ConflictType, DataConflict,
    INTERNAL_SYSTEM,
};
pub use error::{SyncError, SyncResult};
pub use job::{SyncDirection, SyncJob, SyncStatus};
pub use mapping::{MappingStore, MemoryMappingStore, PgMappingStore, ProductMapping};
pub use orchestrator::{
    RecordDisposition, RecordError, SyncConfig, SyncOrchestrator, SyncOutcome,
};
pub use resolver::{
    ConflictResolver, Resolution, ResolutionAction, ResolutionRule, ResolutionStrategy,
};
pub use throttle::RequestBudget;
pub use webhook::{WebhookEvent, WebhookHandler, WebhookOutcome};
