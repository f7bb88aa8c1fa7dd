//! Postgres store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::entity::EntityKind;
use crate::error::{StoreError, StoreResult};
use crate::record::StoredRecord;
use crate::store::{StorePage, StoreWriter};

/// Postgres-backed [`StoreWriter`].
///
/// Backed by a single `merx_records` table keyed by
/// `(org_id, entity, id)` with a JSONB attribute payload. Tenant
/// isolation is enforced by scoping every query to `org_id`.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row for a stored record.
#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: String,
    attributes: serde_json::Value,
    updated_at: DateTime<Utc>,
    last_source: Option<String>,
}

impl RecordRow {
    fn into_record(self) -> StoredRecord {
        StoredRecord {
            id: self.id,
            attributes: self.attributes,
            updated_at: self.updated_at,
            last_source: self.last_source,
        }
    }
}

#[async_trait]
impl StoreWriter for PgStore {
    #[instrument(skip(self))]
    async fn get(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        id: &str,
    ) -> StoreResult<Option<StoredRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, attributes, updated_at, last_source
            FROM merx_records
            WHERE org_id = $1 AND entity = $2 AND id = $3
            "#,
        )
        .bind(org_id)
        .bind(entity.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RecordRow::into_record))
    }

    #[instrument(skip(self, record), fields(id = %record.id))]
    async fn upsert(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        record: &StoredRecord,
    ) -> StoreResult<()> {
        if record.id.is_empty() {
            return Err(StoreError::constraint("record id must not be empty"));
        }
        sqlx::query(
            r#"
            INSERT INTO merx_records (org_id, entity, id, attributes, updated_at, last_source)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (org_id, entity, id)
            DO UPDATE SET attributes = $4, updated_at = $5, last_source = $6
            "#,
        )
        .bind(org_id)
        .bind(entity.as_str())
        .bind(&record.id)
        .bind(&record.attributes)
        .bind(record.updated_at)
        .bind(&record.last_source)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.constraint().is_some() {
                    return StoreError::constraint(db.to_string());
                }
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, org_id: Uuid, entity: EntityKind, id: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "DELETE FROM merx_records WHERE org_id = $1 AND entity = $2 AND id = $3",
        )
        .bind(org_id)
        .bind(entity.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(entity, id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_page(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<StorePage> {
        // Keyset pagination on id; fetch one extra row to learn whether
        // more pages remain.
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, attributes, updated_at, last_source
            FROM merx_records
            WHERE org_id = $1 AND entity = $2 AND ($3::text IS NULL OR id > $3)
            ORDER BY id
            LIMIT $4
            "#,
        )
        .bind(org_id)
        .bind(entity.as_str())
        .bind(cursor)
        .bind(limit as i64 + 1)
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() > limit;
        let records: Vec<StoredRecord> = rows
            .into_iter()
            .take(limit)
            .map(RecordRow::into_record)
            .collect();
        let next_cursor = if has_more {
            records.last().map(|r| r.id.clone())
        } else {
            None
        };

        Ok(StorePage {
            records,
            next_cursor,
            has_more,
        })
    }
}
