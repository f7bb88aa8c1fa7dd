//! Sync orchestration.
//!
//! Drives one [`SyncJob`] to completion: paginated extraction from the
//! connector (pull) or the store (push), mapping, validation, conflict
//! handling, and writes. Per-record failures are captured into the
//! outcome and never abort the run; fatal connector errors abort the
//! job immediately.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use merx_connector::{Connector, ExternalRecord, PushRecord};
use merx_core::{
    inventory, natural_key, overlay_attributes, EntityKind, StoreWriter, StoredRecord,
};

use crate::conflict::{changed_fields, detect_value_conflict, DataConflict, INTERNAL_SYSTEM};
use crate::error::{SyncError, SyncResult};
use crate::job::{SyncDirection, SyncJob};
use crate::mapping::{MappingStore, ProductMapping};
use crate::resolver::{ConflictResolver, ResolutionAction};
use crate::throttle::RequestBudget;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Create a mapping on first sight of an unmapped external record,
    /// keyed by its natural key (SKU). Off by default: unmapped
    /// records fail per-record until an operator maps them or opts in.
    pub auto_map: bool,
    /// Connector requests per minute; 0 disables throttling.
    pub requests_per_minute: u32,
    /// Page size used when enumerating the internal store for push.
    pub push_page_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_map: false,
            requests_per_minute: 0,
            push_page_size: 100,
        }
    }
}

/// What happened to one record on its way through the pipeline.
#[derive(Debug, Clone)]
pub enum RecordDisposition {
    /// A new internal record was created.
    Created,
    /// The internal record was updated without a conflict.
    Updated,
    /// The incoming value matched the stored one; nothing written.
    Skipped,
    /// A conflict was detected and its resolution was written.
    ConflictApplied,
    /// A conflict was detected and the internal value was kept.
    ConflictRetained,
    /// A conflict was detected and routed to manual review.
    ManualReview(DataConflict),
}

/// One failed record, identified by its natural key.
#[derive(Debug, Clone)]
pub struct RecordError {
    /// Natural key (SKU, email, order number) or external id.
    pub key: String,
    /// What went wrong.
    pub message: String,
}

/// Result of one sync run.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Records taken off pages.
    pub records_processed: u64,
    /// Records that produced a store or connector write.
    pub records_updated: u64,
    /// Records that failed.
    pub records_failed: u64,
    /// Records skipped (no change, or internal value retained).
    pub records_skipped: u64,
    /// Conflicts detected.
    pub conflicts_detected: u64,
    /// Conflicts routed to manual review, for the host to persist.
    pub manual_reviews: Vec<DataConflict>,
    /// Per-record failures.
    pub errors: Vec<RecordError>,
}

impl SyncOutcome {
    /// A run succeeds when no record failed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.records_failed == 0
    }

    fn tally(&mut self, disposition: RecordDisposition) {
        match disposition {
            RecordDisposition::Created | RecordDisposition::Updated => {
                self.records_updated += 1;
            }
            RecordDisposition::Skipped => self.records_skipped += 1,
            RecordDisposition::ConflictApplied => {
                self.conflicts_detected += 1;
                self.records_updated += 1;
            }
            RecordDisposition::ConflictRetained => {
                self.conflicts_detected += 1;
                self.records_skipped += 1;
            }
            RecordDisposition::ManualReview(conflict) => {
                self.conflicts_detected += 1;
                self.manual_reviews.push(conflict);
            }
        }
    }

    fn record_failure(&mut self, key: String, message: String) {
        self.records_failed += 1;
        self.errors.push(RecordError { key, message });
    }
}

/// Progress percentage after a page.
///
/// With a known estimate: `processed / estimated * 100`, capped at 99
/// until the final page. Without one: a monotonically increasing
/// approximation that stays below 100 until `has_more` is false.
fn progress_percent(estimated: Option<u64>, processed: u64, pages: u64, has_more: bool) -> f64 {
    if !has_more {
        return 100.0;
    }
    match estimated {
        Some(total) if total > 0 => ((processed as f64 / total as f64) * 100.0).min(99.0),
        _ => 100.0 - 100.0 / (pages as f64 + 1.0),
    }
}

/// Composes a connector, the internal store, the mapping table, and a
/// conflict resolver into the sync pipeline. All collaborators are
/// injected; the orchestrator owns no global state.
pub struct SyncOrchestrator {
    connector: Arc<dyn Connector>,
    store: Arc<dyn StoreWriter>,
    mappings: Arc<dyn MappingStore>,
    resolver: ConflictResolver,
    config: SyncConfig,
    budget: Option<RequestBudget>,
}

impl SyncOrchestrator {
    /// Create an orchestrator with the default resolver and config.
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        store: Arc<dyn StoreWriter>,
        mappings: Arc<dyn MappingStore>,
    ) -> Self {
        Self {
            connector,
            store,
            mappings,
            resolver: ConflictResolver::new(),
            config: SyncConfig::default(),
            budget: None,
        }
    }

    /// Replace the conflict resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.budget = if config.requests_per_minute > 0 {
            Some(RequestBudget::per_minute(config.requests_per_minute))
        } else {
            None
        };
        self.config = config;
        self
    }

    /// The connector's system name.
    #[must_use]
    pub fn system_name(&self) -> &str {
        self.connector.system_name()
    }

    /// Run a sync job to completion.
    ///
    /// `on_progress` receives a percentage after every consumed page.
    /// Per-record failures land in the outcome's error list; a fatal
    /// error fails the job and is returned as `Err`.
    #[instrument(
        skip(self, job, on_progress),
        fields(job_id = %job.id, entity = %job.entity, direction = %job.direction)
    )]
    pub async fn sync<F>(&self, job: &mut SyncJob, mut on_progress: F) -> SyncResult<SyncOutcome>
    where
        F: FnMut(f64) + Send,
    {
        job.start();
        let result = match job.direction {
            SyncDirection::Pull => self.run_pull(job, &mut on_progress).await,
            SyncDirection::Push => self.run_push(job, &mut on_progress).await,
        };

        match result {
            Ok(outcome) => {
                job.complete(outcome.records_failed);
                info!(
                    processed = outcome.records_processed,
                    updated = outcome.records_updated,
                    failed = outcome.records_failed,
                    conflicts = outcome.conflicts_detected,
                    status = %job.status,
                    "Sync run finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                job.fail();
                warn!(error = %e, "Sync run aborted");
                Err(e)
            }
        }
    }

    /// Pull: external system -> internal store.
    async fn run_pull<F>(&self, job: &mut SyncJob, on_progress: &mut F) -> SyncResult<SyncOutcome>
    where
        F: FnMut(f64) + Send,
    {
        let mut outcome = SyncOutcome::default();
        let estimated = self.connector.estimated_total(job.entity);
        let mut pages: u64 = 0;

        loop {
            self.throttle().await;
            // Connector-level fetch failures are always fatal to the job.
            let page = self
                .connector
                .fetch_page(job.entity, job.cursor.as_deref(), &job.filters)
                .await?;

            for record in &page.items {
                outcome.records_processed += 1;
                let key = record
                    .natural_key()
                    .unwrap_or_else(|| record.external_id.clone());
                match self.apply_external_record(job.org_id, record).await {
                    Ok(disposition) => outcome.tally(disposition),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        debug!(key = %key, error = %e, "Record failed");
                        outcome.record_failure(key, e.to_string());
                    }
                }
            }

            pages += 1;
            job.cursor.clone_from(&page.next_cursor);
            job.touch();
            on_progress(progress_percent(
                estimated,
                outcome.records_processed,
                pages,
                page.has_more,
            ));

            if !page.has_more {
                break;
            }
        }

        Ok(outcome)
    }

    /// Push: internal store -> external system.
    async fn run_push<F>(&self, job: &mut SyncJob, on_progress: &mut F) -> SyncResult<SyncOutcome>
    where
        F: FnMut(f64) + Send,
    {
        let mut outcome = SyncOutcome::default();
        let mut pages: u64 = 0;

        loop {
            let page = self
                .store
                .list_page(
                    job.org_id,
                    job.entity,
                    job.cursor.as_deref(),
                    self.config.push_page_size,
                )
                .await?;

            for record in &page.records {
                if let Some(ids) = &job.filters.product_ids {
                    if !ids.contains(&record.id) {
                        continue;
                    }
                }
                outcome.records_processed += 1;
                let key =
                    natural_key(job.entity, &record.attributes).unwrap_or_else(|| record.id.clone());
                match self.push_record(job.org_id, job.entity, record).await {
                    Ok(()) => outcome.records_updated += 1,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        debug!(key = %key, error = %e, "Push record failed");
                        outcome.record_failure(key, e.to_string());
                    }
                }
            }

            pages += 1;
            job.cursor.clone_from(&page.next_cursor);
            job.touch();
            on_progress(progress_percent(
                None,
                outcome.records_processed,
                pages,
                page.has_more,
            ));

            if !page.has_more {
                break;
            }
        }

        Ok(outcome)
    }

    /// Run one external record through the map -> validate -> conflict
    /// -> resolve -> write pipeline.
    ///
    /// Also the entry point for webhook ingestion, which is a
    /// single-record sync.
    pub async fn apply_external_record(
        &self,
        org_id: Uuid,
        record: &ExternalRecord,
    ) -> SyncResult<RecordDisposition> {
        let system = self.connector.system_name();
        let entity = record.entity;

        let internal_id = match self
            .mappings
            .find_by_external(org_id, entity, system, &record.external_id)
            .await?
        {
            Some(mapping) => mapping.internal_id,
            None => self.auto_map(org_id, record, system).await?,
        };

        let stored = self.store.get(org_id, entity, &internal_id).await?;
        self.validate(record, stored.is_none())?;

        let Some(existing) = stored else {
            let created =
                StoredRecord::from_source(&internal_id, record.attributes.clone(), system);
            self.store.upsert(org_id, entity, &created).await?;
            return Ok(RecordDisposition::Created);
        };

        if changed_fields(&existing.attributes, &record.attributes).is_empty() {
            // Replaying an already-applied record is a no-op.
            return Ok(RecordDisposition::Skipped);
        }

        match detect_value_conflict(entity, &internal_id, &existing, record, system) {
            None => {
                // Continuation of this source's own stream: write through.
                let merged = overlay_attributes(existing.attributes, &record.attributes);
                let updated = StoredRecord::from_source(&internal_id, merged, system);
                self.store.upsert(org_id, entity, &updated).await?;
                Ok(RecordDisposition::Updated)
            }
            Some(conflict) => {
                self.settle_conflict(org_id, entity, &internal_id, existing, conflict, system)
                    .await
            }
        }
    }

    /// Resolve a detected conflict and apply its resolution.
    async fn settle_conflict(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        internal_id: &str,
        existing: StoredRecord,
        conflict: DataConflict,
        system: &str,
    ) -> SyncResult<RecordDisposition> {
        let resolution = self.resolver.resolve(&conflict);
        info!(
            conflict_id = %conflict.id,
            entity_id = %internal_id,
            action = %resolution.action,
            reason = %resolution.reason,
            "Conflict resolved"
        );

        match resolution.action {
            ResolutionAction::AcceptSource => {
                if resolution.winning_system.as_deref() == Some(INTERNAL_SYSTEM) {
                    return Ok(RecordDisposition::ConflictRetained);
                }
                let payload = resolution
                    .payload
                    .ok_or_else(|| SyncError::internal("accept resolution carries no payload"))?;
                let winner = resolution
                    .winning_system
                    .unwrap_or_else(|| system.to_string());
                let merged = overlay_attributes(existing.attributes, &payload);
                let updated = StoredRecord::from_source(internal_id, merged, winner);
                self.store.upsert(org_id, entity, &updated).await?;
                Ok(RecordDisposition::ConflictApplied)
            }
            ResolutionAction::Merge => {
                let payload = resolution
                    .payload
                    .ok_or_else(|| SyncError::internal("merge resolution carries no payload"))?;
                let merged = overlay_attributes(existing.attributes, &payload);
                let updated = StoredRecord::from_source(internal_id, merged, system);
                self.store.upsert(org_id, entity, &updated).await?;
                Ok(RecordDisposition::ConflictApplied)
            }
            ResolutionAction::ManualReview => Ok(RecordDisposition::ManualReview(conflict)),
        }
    }

    /// Push one internal record to the external system, creating the
    /// mapping from the returned external id when none existed.
    async fn push_record(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        record: &StoredRecord,
    ) -> SyncResult<()> {
        self.throttle().await;
        let system = self.connector.system_name();
        let mapping = self
            .mappings
            .find_by_internal(org_id, entity, system, &record.id)
            .await?;

        let push = PushRecord {
            external_id: mapping.as_ref().map(|m| m.external_id.clone()),
            attributes: record.attributes.clone(),
        };
        let applied = self.connector.apply_record(entity, &push).await?;

        if mapping.is_none() {
            let mapping =
                ProductMapping::new(org_id, entity, &record.id, system, &applied.external_id);
            if let Err(e) = self.mappings.create(&mapping).await {
                // A concurrent run may have created it; the push itself
                // succeeded either way.
                warn!(internal_id = %record.id, error = %e, "Could not record push mapping");
            }
        }
        Ok(())
    }

    /// Lazily create a mapping for an unmapped external record, when
    /// configured. Keyed by the record's natural key (SKU).
    async fn auto_map(
        &self,
        org_id: Uuid,
        record: &ExternalRecord,
        system: &str,
    ) -> SyncResult<String> {
        let key = record
            .natural_key()
            .unwrap_or_else(|| record.external_id.clone());
        if !self.config.auto_map {
            return Err(SyncError::mapping(
                key,
                format!(
                    "no mapping for external id '{}' on '{}' and auto-mapping is disabled",
                    record.external_id, system
                ),
            ));
        }
        let internal_id = record.natural_key().ok_or_else(|| {
            SyncError::mapping(
                &record.external_id,
                format!(
                    "record has no '{}' attribute to auto-map by",
                    record.entity.natural_key_field()
                ),
            )
        })?;

        let mapping =
            ProductMapping::new(org_id, record.entity, &internal_id, system, &record.external_id);
        self.mappings.create(&mapping).await?;
        debug!(
            internal_id = %internal_id,
            external_id = %record.external_id,
            system = %system,
            "Auto-created mapping"
        );
        Ok(internal_id)
    }

    /// Validate an incoming record. Required fields are enforced on
    /// creation; quantity rules apply to every inventory payload.
    fn validate(&self, record: &ExternalRecord, is_create: bool) -> SyncResult<()> {
        let key = record
            .natural_key()
            .unwrap_or_else(|| record.external_id.clone());

        if is_create {
            for field in record.entity.required_fields() {
                match record.attributes.get(field) {
                    Some(v) if !v.is_null() => {}
                    _ => {
                        return Err(SyncError::validation(
                            key,
                            format!("missing required field: {field}"),
                        ))
                    }
                }
            }
        }

        if record.entity == EntityKind::Inventory {
            inventory::validate_quantities(&record.attributes)
                .map_err(|m| SyncError::validation(&key, m))?;
        }

        Ok(())
    }

    async fn throttle(&self) {
        if let Some(budget) = &self.budget {
            budget.acquire().await;
        }
    }
}
