//! Product mapping store.
//!
//! A [`ProductMapping`] associates an internal entity id with one
//! external id per external system. The sync path only ever reads
//! existing mappings or appends new ones; mappings are never mutated
//! in place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

use merx_core::EntityKind;

use crate::error::{SyncError, SyncResult};

/// Durable cross-reference between an internal entity and one external
/// system's id for it.
///
/// Invariant: at most one mapping per (internal id, external system)
/// pair, and at most one per (external id, external system) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductMapping {
    /// Mapping id.
    pub id: Uuid,
    /// Owning organization.
    pub org_id: Uuid,
    /// Entity kind.
    pub entity: EntityKind,
    /// Internal record id.
    pub internal_id: String,
    /// External system name.
    pub external_system: String,
    /// Id of the record in the external system.
    pub external_id: String,
    /// When the mapping was created.
    pub created_at: DateTime<Utc>,
}

impl ProductMapping {
    /// Create a new mapping.
    pub fn new(
        org_id: Uuid,
        entity: EntityKind,
        internal_id: impl Into<String>,
        external_system: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            entity,
            internal_id: internal_id.into(),
            external_system: external_system.into(),
            external_id: external_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Read/append access to the mapping table.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Resolve the internal record a given external record updates.
    async fn find_by_external(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        external_system: &str,
        external_id: &str,
    ) -> SyncResult<Option<ProductMapping>>;

    /// Resolve the external id for a given internal record.
    async fn find_by_internal(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        external_system: &str,
        internal_id: &str,
    ) -> SyncResult<Option<ProductMapping>>;

    /// Append a new mapping, enforcing the uniqueness invariants.
    async fn create(&self, mapping: &ProductMapping) -> SyncResult<()>;
}

/// In-memory [`MappingStore`].
#[derive(Default)]
pub struct MemoryMappingStore {
    mappings: RwLock<Vec<ProductMapping>>,
}

impl MemoryMappingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mappings held.
    pub async fn len(&self) -> usize {
        self.mappings.read().await.len()
    }

    /// Check whether the store holds no mappings.
    pub async fn is_empty(&self) -> bool {
        self.mappings.read().await.is_empty()
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn find_by_external(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        external_system: &str,
        external_id: &str,
    ) -> SyncResult<Option<ProductMapping>> {
        let mappings = self.mappings.read().await;
        Ok(mappings
            .iter()
            .find(|m| {
                m.org_id == org_id
                    && m.entity == entity
                    && m.external_system == external_system
                    && m.external_id == external_id
            })
            .cloned())
    }

    async fn find_by_internal(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        external_system: &str,
        internal_id: &str,
    ) -> SyncResult<Option<ProductMapping>> {
        let mappings = self.mappings.read().await;
        Ok(mappings
            .iter()
            .find(|m| {
                m.org_id == org_id
                    && m.entity == entity
                    && m.external_system == external_system
                    && m.internal_id == internal_id
            })
            .cloned())
    }

    async fn create(&self, mapping: &ProductMapping) -> SyncResult<()> {
        let mut mappings = self.mappings.write().await;
        let clash = mappings.iter().any(|m| {
            m.org_id == mapping.org_id
                && m.entity == mapping.entity
                && m.external_system == mapping.external_system
                && (m.internal_id == mapping.internal_id || m.external_id == mapping.external_id)
        });
        if clash {
            return Err(SyncError::duplicate_mapping(
                &mapping.internal_id,
                &mapping.external_system,
            ));
        }
        mappings.push(mapping.clone());
        Ok(())
    }
}

/// Postgres-backed [`MappingStore`].
pub struct PgMappingStore {
    pool: PgPool,
}

impl PgMappingStore {
    /// Create a new store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row for a product mapping.
#[derive(Debug, sqlx::FromRow)]
struct MappingRow {
    id: Uuid,
    org_id: Uuid,
    entity: String,
    internal_id: String,
    external_system: String,
    external_id: String,
    created_at: DateTime<Utc>,
}

impl MappingRow {
    fn into_mapping(self) -> SyncResult<ProductMapping> {
        let entity = self
            .entity
            .parse()
            .map_err(|e: String| SyncError::internal(e))?;
        Ok(ProductMapping {
            id: self.id,
            org_id: self.org_id,
            entity,
            internal_id: self.internal_id,
            external_system: self.external_system,
            external_id: self.external_id,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl MappingStore for PgMappingStore {
    #[instrument(skip(self))]
    async fn find_by_external(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        external_system: &str,
        external_id: &str,
    ) -> SyncResult<Option<ProductMapping>> {
        let row = sqlx::query_as::<_, MappingRow>(
            r#"
            SELECT id, org_id, entity, internal_id, external_system, external_id, created_at
            FROM merx_mappings
            WHERE org_id = $1 AND entity = $2 AND external_system = $3 AND external_id = $4
            "#,
        )
        .bind(org_id)
        .bind(entity.as_str())
        .bind(external_system)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MappingRow::into_mapping).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_internal(
        &self,
        org_id: Uuid,
        entity: EntityKind,
        external_system: &str,
        internal_id: &str,
    ) -> SyncResult<Option<ProductMapping>> {
        let row = sqlx::query_as::<_, MappingRow>(
            r#"
            SELECT id, org_id, entity, internal_id, external_system, external_id, created_at
            FROM merx_mappings
            WHERE org_id = $1 AND entity = $2 AND external_system = $3 AND internal_id = $4
            "#,
        )
        .bind(org_id)
        .bind(entity.as_str())
        .bind(external_system)
        .bind(internal_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MappingRow::into_mapping).transpose()
    }

    #[instrument(skip(self, mapping), fields(internal_id = %mapping.internal_id))]
    async fn create(&self, mapping: &ProductMapping) -> SyncResult<()> {
        // Uniqueness is enforced by the table's constraints; a conflict
        // surfaces as the duplicate-mapping error.
        let result = sqlx::query(
            r#"
            INSERT INTO merx_mappings (
                id, org_id, entity, internal_id, external_system, external_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(mapping.id)
        .bind(mapping.org_id)
        .bind(mapping.entity.as_str())
        .bind(&mapping.internal_id)
        .bind(&mapping.external_system)
        .bind(&mapping.external_id)
        .bind(mapping.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::duplicate_mapping(
                &mapping.internal_id,
                &mapping.external_system,
            ));
        }
        Ok(())
    }
}
