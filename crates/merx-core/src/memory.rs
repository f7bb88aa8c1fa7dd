//! In-memory store implementation.
//!
//! Reference implementation of the [`StoreWriter`] seam, used by unit
//! and integration tests and by hosts that stage records before
//! committing them elsewhere.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entity::EntityKind;
use crate::error::{StoreError, StoreResult};
use crate::record::StoredRecord;
use crate::store::{StorePage, StoreWriter};

type Key = (Uuid, EntityKind, String);

/// In-memory [`StoreWriter`] backed by an ordered map.
///
/// Records are kept in id order so `list_page` pagination is stable.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<Key, StoredRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records for one organization and entity kind.
    pub async fn count(&self, org_id: Uuid, entity: EntityKind) -> usize {
        self.records
            .read()
            .await
            .keys()
            .filter(|(o, e, _)| *o == org_id && *e == entity)
            .count()
    }
}

#[async_trait]
impl StoreWriter for MemoryStore {
    async fn get(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        id: &str,
    ) -> StoreResult<Option<StoredRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&(org_id, entity, id.to_string())).cloned())
    }

    async fn upsert(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        record: &StoredRecord,
    ) -> StoreResult<()> {
        if record.id.is_empty() {
            return Err(StoreError::constraint("record id must not be empty"));
        }
        let mut records = self.records.write().await;
        records.insert((org_id, entity, record.id.clone()), record.clone());
        Ok(())
    }

    async fn delete(&self, org_id: Uuid, entity: EntityKind, id: &str) -> StoreResult<()> {
        let mut records = self.records.write().await;
        match records.remove(&(org_id, entity, id.to_string())) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found(entity, id)),
        }
    }

    async fn list_page(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<StorePage> {
        let records = self.records.read().await;
        // Cursor is the last id of the previous page; iteration resumes
        // strictly after it.
        let mut page: Vec<StoredRecord> = Vec::with_capacity(limit);
        let mut has_more = false;
        for ((o, e, id), record) in records.iter() {
            if *o != org_id || *e != entity {
                continue;
            }
            if let Some(after) = cursor {
                if id.as_str() <= after {
                    continue;
                }
            }
            if page.len() == limit {
                has_more = true;
                break;
            }
            page.push(record.clone());
        }
        let next_cursor = if has_more {
            page.last().map(|r| r.id.clone())
        } else {
            None
        };
        Ok(StorePage {
            records: page,
            next_cursor,
            has_more,
        })
    }
}
