//! The store writer seam.
//!
//! Consumed by both the sync orchestrator and the bulk operations
//! engine. Implementations enforce tenant isolation and schema
//! constraints themselves; the engines only see success or error per
//! single-record operation.

use async_trait::async_trait;
use uuid::Uuid;

use crate::entity::EntityKind;
use crate::error::StoreResult;
use crate::record::StoredRecord;

/// One page of records from [`StoreWriter::list_page`].
#[derive(Debug, Clone)]
pub struct StorePage {
    /// Records in this page.
    pub records: Vec<StoredRecord>,
    /// Cursor for the next page, if any.
    pub next_cursor: Option<String>,
    /// Whether more pages remain.
    pub has_more: bool,
}

impl StorePage {
    /// An empty terminal page.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }
}

/// Write access to the internal store.
///
/// Writes are atomic per record only. Multi-record consistency is
/// achieved by the caller (the bulk engine's rollback), never by
/// store-level transactions.
#[async_trait]
pub trait StoreWriter: Send + Sync {
    /// Fetch a single record.
    async fn get(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        id: &str,
    ) -> StoreResult<Option<StoredRecord>>;

    /// Insert or update a record.
    async fn upsert(&self, org_id: Uuid, entity: EntityKind, record: &StoredRecord)
        -> StoreResult<()>;

    /// Delete a record. Errors with `NotFound` when the id is absent.
    async fn delete(&self, org_id: Uuid, entity: EntityKind, id: &str) -> StoreResult<()>;

    /// Enumerate records page by page, in stable id order.
    ///
    /// The cursor is opaque to callers; `None` starts from the
    /// beginning. Needed by the push sync direction and CSV export,
    /// which read the internal side the way pull reads the connector.
    async fn list_page(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<StorePage>;
}
