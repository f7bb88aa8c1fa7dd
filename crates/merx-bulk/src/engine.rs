//! Bulk operation execution.
//!
//! One operation runs on a spawned task: records are partitioned into
//! chunks, up to `max_concurrent` chunks run at once behind a
//! semaphore, and each chunk applies its records strictly in file
//! order. Concurrent chunks finish in any order, so rollback works
//! from the per-record completion log and each record's own captured
//! before-value, never from sibling-chunk ordering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use merx_core::{natural_key, overlay_attributes, EntityKind, StoreWriter, StoredRecord};

use crate::csv::{parse_records, write_report, CsvOptions, FieldMapping, ParseOutcome};
use crate::error::{BulkError, BulkResult};
use crate::operation::{
    BulkOperation, BulkOperationRecord, BulkOptions, BulkRecord, BulkStatus, OperationType,
    RecordAction, RecordStatus,
};
use crate::validation::validate_record;

/// Page size used when enumerating the store for export.
const EXPORT_PAGE_SIZE: usize = 500;

/// Live state of one operation.
struct OperationState {
    operation: RwLock<BulkOperation>,
    records: RwLock<Vec<BulkOperationRecord>>,
    /// Parsed input rows; immutable once the operation starts.
    inputs: Vec<BulkRecord>,
    /// Cooperative cancellation, checked between chunks.
    cancel: AtomicBool,
    /// Stops intake of further chunks (first failure under
    /// rollback-on-error).
    halt: AtomicBool,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    /// Indices of successfully applied records, in completion order.
    completion_log: Mutex<Vec<usize>>,
}

/// Point-in-time progress of an operation.
#[derive(Debug, Clone)]
pub struct BulkProgress {
    /// Operation id.
    pub id: Uuid,
    /// Current status.
    pub status: BulkStatus,
    /// Total input records.
    pub total_records: usize,
    /// Records with a terminal verdict so far.
    pub processed_records: usize,
    /// Successful so far.
    pub successful_records: usize,
    /// Failed so far.
    pub failed_records: usize,
    /// Percentage of records processed.
    pub percent: f64,
}

/// The bulk operations engine.
///
/// Holds the store seam and the registry of live operations. All
/// dependencies are injected; construct one per host process and share
/// it behind an `Arc`.
pub struct BulkEngine {
    store: Arc<dyn StoreWriter>,
    operations: RwLock<HashMap<Uuid, Arc<OperationState>>>,
}

impl BulkEngine {
    /// Create an engine over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn StoreWriter>) -> Self {
        Self {
            store,
            operations: RwLock::new(HashMap::new()),
        }
    }

    /// Parse a CSV file and start an operation over it.
    pub async fn start_from_csv(
        &self,
        org_id: Uuid,
        input: &str,
        mapping: &FieldMapping,
        csv_options: &CsvOptions,
        options: BulkOptions,
        created_by: Option<Uuid>,
    ) -> BulkResult<Uuid> {
        let parsed = parse_records(input, mapping, csv_options)?;
        self.start(org_id, parsed, options, created_by).await
    }

    /// Start an operation over already-parsed records.
    ///
    /// Returns immediately with the operation id; processing continues
    /// on a spawned task.
    #[instrument(skip(self, parsed, options), fields(org_id = %org_id))]
    pub async fn start(
        &self,
        org_id: Uuid,
        parsed: ParseOutcome,
        options: BulkOptions,
        created_by: Option<Uuid>,
    ) -> BulkResult<Uuid> {
        if options.chunk_size == 0 {
            return Err(BulkError::invalid_options("chunk_size must be positive"));
        }
        if options.max_concurrent == 0 {
            return Err(BulkError::invalid_options("max_concurrent must be positive"));
        }
        if options.operation_type == OperationType::Export {
            return Err(BulkError::invalid_options(
                "export reads the store; use BulkEngine::export",
            ));
        }

        let total = parsed.total_rows();
        let operation = BulkOperation::new(org_id, &options, total, created_by);
        let id = operation.id;

        let mut records: Vec<BulkOperationRecord> =
            (0..total).map(BulkOperationRecord::pending).collect();
        for error in &parsed.errors {
            let record = &mut records[error.index];
            record.status = RecordStatus::Failed;
            record.error = Some(format!("line {}: {}", error.line, error.message));
            record.processed_at = Some(Utc::now());
        }

        let state = Arc::new(OperationState {
            operation: RwLock::new(operation),
            records: RwLock::new(records),
            inputs: parsed.records,
            cancel: AtomicBool::new(false),
            halt: AtomicBool::new(false),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(parsed.errors.len()),
            completion_log: Mutex::new(Vec::new()),
        });

        self.operations.write().await.insert(id, state.clone());

        info!(
            operation_id = %id,
            operation_type = %options.operation_type,
            entity = %options.entity,
            total_records = total,
            "Bulk operation submitted"
        );

        let store = self.store.clone();
        tokio::spawn(async move {
            run_operation(state, store).await;
        });

        Ok(id)
    }

    /// Request cooperative cancellation. Already-dispatched chunks
    /// finish; no further chunks start.
    pub async fn cancel(&self, id: Uuid) -> BulkResult<()> {
        let state = self.state(id).await?;
        {
            let operation = state.operation.read().await;
            if operation.status.is_terminal() {
                return Err(BulkError::invalid_state(
                    id,
                    operation.status.as_str(),
                    "cancel",
                ));
            }
        }
        state.cancel.store(true, Ordering::SeqCst);
        info!(operation_id = %id, "Cancellation requested");
        Ok(())
    }

    /// Roll back a finished operation: every successful record is
    /// restored from its captured before-value, newest first.
    pub async fn rollback(&self, id: Uuid) -> BulkResult<BulkOperation> {
        let state = self.state(id).await?;
        let (org_id, entity) = {
            let operation = state.operation.read().await;
            match operation.status {
                BulkStatus::Completed | BulkStatus::CompletedWithErrors => {}
                status => {
                    return Err(BulkError::invalid_state(id, status.as_str(), "rollback"))
                }
            }
            (operation.org_id, operation.entity)
        };

        let warnings = rollback_applied(&state, self.store.as_ref(), org_id, entity).await;

        let mut operation = state.operation.write().await;
        operation.warnings.extend(warnings);
        operation.status = BulkStatus::RolledBack;
        operation.updated_at = Utc::now();
        info!(operation_id = %id, "Operation rolled back");
        Ok(operation.clone())
    }

    /// Current progress of an operation.
    pub async fn progress(&self, id: Uuid) -> BulkResult<BulkProgress> {
        let state = self.state(id).await?;
        let operation = state.operation.read().await;
        let succeeded = state.succeeded.load(Ordering::SeqCst);
        let failed = state.failed.load(Ordering::SeqCst);
        let processed = succeeded + failed;
        let percent = if operation.total_records == 0 {
            100.0
        } else {
            (processed as f64 / operation.total_records as f64) * 100.0
        };
        Ok(BulkProgress {
            id,
            status: operation.status,
            total_records: operation.total_records,
            processed_records: processed,
            successful_records: succeeded,
            failed_records: failed,
            percent,
        })
    }

    /// The operation header.
    pub async fn operation(&self, id: Uuid) -> BulkResult<BulkOperation> {
        let state = self.state(id).await?;
        let operation = state.operation.read().await;
        Ok(operation.clone())
    }

    /// Per-record outcomes, in input order.
    pub async fn records(&self, id: Uuid) -> BulkResult<Vec<BulkOperationRecord>> {
        let state = self.state(id).await?;
        let records = state.records.read().await;
        Ok(records.clone())
    }

    /// The CSV outcome report for an operation.
    pub async fn report(&self, id: Uuid) -> BulkResult<String> {
        let records = self.records(id).await?;
        write_report(&records)
    }

    /// Block until the operation reaches a terminal status.
    pub async fn wait(&self, id: Uuid) -> BulkResult<BulkOperation> {
        let state = self.state(id).await?;
        loop {
            {
                let operation = state.operation.read().await;
                if operation.status.is_terminal() {
                    return Ok(operation.clone());
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Export the store's records for one entity kind as CSV:
    /// id, attribute payload, last update timestamp.
    pub async fn export(&self, org_id: Uuid, entity: EntityKind) -> BulkResult<String> {
        let mut writer = ::csv::Writer::from_writer(Vec::new());
        writer.write_record(["id", "attributes", "updated_at"])?;

        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .store
                .list_page(org_id, entity, cursor.as_deref(), EXPORT_PAGE_SIZE)
                .await?;
            for record in &page.records {
                writer.write_record([
                    record.id.clone(),
                    serde_json::to_string(&record.attributes)?,
                    record.updated_at.to_rfc3339(),
                ])?;
            }
            if !page.has_more {
                break;
            }
            cursor = page.next_cursor;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| BulkError::invalid_options(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| BulkError::invalid_options(e.to_string()))
    }

    async fn state(&self, id: Uuid) -> BulkResult<Arc<OperationState>> {
        self.operations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| BulkError::unknown(id))
    }
}

/// Drive one operation: dispatch chunks, join them, finalize.
async fn run_operation(state: Arc<OperationState>, store: Arc<dyn StoreWriter>) {
    let (id, org_id, entity, operation_type, validate_only, rollback_on_error) = {
        let mut operation = state.operation.write().await;
        operation.status = BulkStatus::Running;
        operation.updated_at = Utc::now();
        (
            operation.id,
            operation.org_id,
            operation.entity,
            operation.operation_type,
            operation.validate_only,
            operation.rollback_on_error,
        )
    };
    let (chunk_size, max_concurrent) = {
        let operation = state.operation.read().await;
        (operation.chunk_size, operation.max_concurrent)
    };

    // Parse errors are record failures; under rollback-on-error they
    // stop intake before any chunk is dispatched.
    if rollback_on_error && state.failed.load(Ordering::SeqCst) > 0 {
        state.halt.store(true, Ordering::SeqCst);
    }

    let chunks: Vec<Vec<usize>> = (0..state.inputs.len())
        .collect::<Vec<usize>>()
        .chunks(chunk_size)
        .map(<[usize]>::to_vec)
        .collect();

    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let mut handles = Vec::new();
    let mut cancelled = false;

    for chunk in chunks {
        if state.cancel.load(Ordering::SeqCst) {
            cancelled = true;
            break;
        }
        if state.halt.load(Ordering::SeqCst) {
            break;
        }
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        // Both flags may have flipped while waiting for a slot.
        if state.cancel.load(Ordering::SeqCst) {
            cancelled = true;
            break;
        }
        if state.halt.load(Ordering::SeqCst) {
            break;
        }

        let state = state.clone();
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            process_chunk(
                &state,
                store.as_ref(),
                org_id,
                entity,
                operation_type,
                validate_only,
                rollback_on_error,
                &chunk,
            )
            .await;
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    finalize(&state, store.as_ref(), id, org_id, entity, cancelled).await;
}

/// Apply one chunk's records sequentially, in file order.
#[allow(clippy::too_many_arguments)]
async fn process_chunk(
    state: &OperationState,
    store: &dyn StoreWriter,
    org_id: Uuid,
    entity: EntityKind,
    operation_type: OperationType,
    validate_only: bool,
    rollback_on_error: bool,
    chunk: &[usize],
) {
    for &position in chunk {
        let input = &state.inputs[position];
        match process_record(store, org_id, entity, operation_type, validate_only, input).await {
            Ok(applied) => {
                state.succeeded.fetch_add(1, Ordering::SeqCst);
                state.completion_log.lock().await.push(input.index);
                let mut records = state.records.write().await;
                let record = &mut records[input.index];
                record.record_id = Some(applied.record_id);
                record.action = applied.action;
                record.status = RecordStatus::Success;
                record.before = applied.before;
                record.after = applied.after;
                record.processed_at = Some(Utc::now());
            }
            Err(message) => {
                debug!(index = input.index, error = %message, "Bulk record failed");
                state.failed.fetch_add(1, Ordering::SeqCst);
                {
                    let mut records = state.records.write().await;
                    let record = &mut records[input.index];
                    record.status = RecordStatus::Failed;
                    record.error = Some(message);
                    record.processed_at = Some(Utc::now());
                }
                if rollback_on_error {
                    // Halt intake; the rest of this chunk is never
                    // attempted and stays pending until finalize.
                    state.halt.store(true, Ordering::SeqCst);
                    return;
                }
            }
        }
    }
}

/// A successfully applied record.
struct AppliedRecord {
    record_id: String,
    action: RecordAction,
    before: Option<serde_json::Value>,
    after: Option<serde_json::Value>,
}

/// Validate and apply one record. Errors are per-record message
/// strings; nothing escapes the record boundary.
async fn process_record(
    store: &dyn StoreWriter,
    org_id: Uuid,
    entity: EntityKind,
    operation_type: OperationType,
    validate_only: bool,
    input: &BulkRecord,
) -> Result<AppliedRecord, String> {
    validate_record(entity, operation_type, &input.attributes)?;

    let id = natural_key(entity, &input.attributes).ok_or_else(|| {
        format!(
            "missing record key field: {}",
            entity.natural_key_field()
        )
    })?;

    if validate_only {
        return Ok(AppliedRecord {
            record_id: id,
            action: RecordAction::Validated,
            before: None,
            after: None,
        });
    }

    match operation_type {
        OperationType::Import => {
            let before = store
                .get(org_id, entity, &id)
                .await
                .map_err(|e| e.to_string())?;
            let record = StoredRecord::new(&id, input.attributes.clone());
            store
                .upsert(org_id, entity, &record)
                .await
                .map_err(|e| e.to_string())?;
            let action = if before.is_some() {
                RecordAction::Updated
            } else {
                RecordAction::Created
            };
            Ok(AppliedRecord {
                record_id: id,
                action,
                before: before.map(|b| b.attributes),
                after: Some(input.attributes.clone()),
            })
        }
        OperationType::Update => {
            let before = store
                .get(org_id, entity, &id)
                .await
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("{entity} not found: {id}"))?;
            let merged = overlay_attributes(before.attributes.clone(), &input.attributes);
            store
                .upsert(org_id, entity, &StoredRecord::new(&id, merged.clone()))
                .await
                .map_err(|e| e.to_string())?;
            Ok(AppliedRecord {
                record_id: id,
                action: RecordAction::Updated,
                before: Some(before.attributes),
                after: Some(merged),
            })
        }
        OperationType::Delete => {
            let before = store
                .get(org_id, entity, &id)
                .await
                .map_err(|e| e.to_string())?;
            store
                .delete(org_id, entity, &id)
                .await
                .map_err(|e| e.to_string())?;
            Ok(AppliedRecord {
                record_id: id,
                action: RecordAction::Deleted,
                before: before.map(|b| b.attributes),
                after: None,
            })
        }
        OperationType::Export => Err("export does not process individual records".to_string()),
    }
}

/// Mark never-attempted records, run rollback when a failure halted
/// intake, and settle the terminal status.
async fn finalize(
    state: &OperationState,
    store: &dyn StoreWriter,
    id: Uuid,
    org_id: Uuid,
    entity: EntityKind,
    cancelled: bool,
) {
    {
        let mut records = state.records.write().await;
        for record in records.iter_mut() {
            if record.status == RecordStatus::Pending {
                record.status = RecordStatus::Skipped;
            }
        }
    }

    let halted = state.halt.load(Ordering::SeqCst);
    let warnings = if halted {
        rollback_applied(state, store, org_id, entity).await
    } else {
        Vec::new()
    };

    let succeeded = state.succeeded.load(Ordering::SeqCst);
    let failed = state.failed.load(Ordering::SeqCst);

    let mut operation = state.operation.write().await;
    operation.successful_records = succeeded;
    operation.failed_records = failed;
    operation.warnings.extend(warnings);
    operation.status = if halted {
        BulkStatus::RolledBack
    } else if cancelled {
        BulkStatus::Cancelled
    } else if failed > 0 {
        BulkStatus::CompletedWithErrors
    } else {
        BulkStatus::Completed
    };
    operation.updated_at = Utc::now();

    info!(
        operation_id = %id,
        status = %operation.status,
        succeeded = succeeded,
        failed = failed,
        "Bulk operation finished"
    );
}

/// Restore successfully applied records in reverse completion order.
///
/// Creates are deleted, updates restored from their before-values.
/// Deletes have no before-state to restore; each becomes a warning.
/// Returns the warnings gathered along the way.
async fn rollback_applied(
    state: &OperationState,
    store: &dyn StoreWriter,
    org_id: Uuid,
    entity: EntityKind,
) -> Vec<String> {
    let log: Vec<usize> = state.completion_log.lock().await.clone();
    let mut warnings = Vec::new();
    let mut records = state.records.write().await;

    for &index in log.iter().rev() {
        let record = &mut records[index];
        if record.status != RecordStatus::Success {
            continue;
        }
        let Some(record_id) = record.record_id.clone() else {
            warnings.push(format!("record {index}: no record id captured; not rolled back"));
            continue;
        };

        match record.action {
            RecordAction::Created => match store.delete(org_id, entity, &record_id).await {
                Ok(()) => record.status = RecordStatus::RolledBack,
                Err(e) if e.is_not_found() => record.status = RecordStatus::RolledBack,
                Err(e) => {
                    warn!(index = index, error = %e, "Rollback delete failed");
                    warnings.push(format!("record {index}: rollback failed: {e}"));
                }
            },
            RecordAction::Updated => {
                let Some(before) = record.before.clone() else {
                    warnings.push(format!(
                        "record {index}: no before-value captured; not rolled back"
                    ));
                    continue;
                };
                let restored = StoredRecord::new(&record_id, before);
                match store.upsert(org_id, entity, &restored).await {
                    Ok(()) => record.status = RecordStatus::RolledBack,
                    Err(e) => {
                        warn!(index = index, error = %e, "Rollback restore failed");
                        warnings.push(format!("record {index}: rollback failed: {e}"));
                    }
                }
            }
            RecordAction::Deleted => {
                warnings.push(format!(
                    "record {index}: deleted record '{record_id}' cannot be restored"
                ));
            }
            RecordAction::Validated | RecordAction::None => {
                // Nothing was written; nothing to undo.
            }
        }
    }

    warnings
}
