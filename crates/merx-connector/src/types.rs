//! Connector data types: fetched records, pages, push payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use merx_core::EntityKind;

/// A single unit fetched from an external system.
///
/// Transient: exists only between the connector fetch and the mapping
/// step, never persisted as its own entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRecord {
    /// Identifier of the record in the external system.
    pub external_id: String,
    /// Entity kind this record represents.
    pub entity: EntityKind,
    /// Raw attribute payload as reported by the external system.
    pub attributes: serde_json::Value,
    /// When the external system last modified the record, if reported.
    pub updated_at: Option<DateTime<Utc>>,
}

impl ExternalRecord {
    /// Create a new external record.
    pub fn new(
        external_id: impl Into<String>,
        entity: EntityKind,
        attributes: serde_json::Value,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            entity,
            attributes,
            updated_at: None,
        }
    }

    /// Set the external modification timestamp.
    #[must_use]
    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    /// The record's natural key (SKU, email, order number) when present.
    #[must_use]
    pub fn natural_key(&self) -> Option<String> {
        merx_core::natural_key(self.entity, &self.attributes)
    }
}

/// One page of records from a paginated fetch.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Records in this page, in the external system's cursor order.
    pub items: Vec<ExternalRecord>,
    /// Whether more pages remain.
    pub has_more: bool,
    /// Cursor for the next page.
    pub next_cursor: Option<String>,
}

impl Page {
    /// A terminal page with the given items.
    #[must_use]
    pub fn last(items: Vec<ExternalRecord>) -> Self {
        Self {
            items,
            has_more: false,
            next_cursor: None,
        }
    }

    /// A non-terminal page with a continuation cursor.
    pub fn continued(items: Vec<ExternalRecord>, next_cursor: impl Into<String>) -> Self {
        Self {
            items,
            has_more: true,
            next_cursor: Some(next_cursor.into()),
        }
    }
}

/// A mapped record pushed to the external system.
#[derive(Debug, Clone)]
pub struct PushRecord {
    /// Known external id, when a mapping already exists. `None` asks
    /// the connector to create the object.
    pub external_id: Option<String>,
    /// Attribute payload in the external system's shape.
    pub attributes: serde_json::Value,
}

/// Result of pushing one record.
#[derive(Debug, Clone)]
pub struct PushOutcome {
    /// Identifier of the record in the external system after the write.
    pub external_id: String,
    /// Whether the write created a new external object.
    pub created: bool,
}

/// Optional filters narrowing a sync run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncFilters {
    /// Restrict to one warehouse/location.
    pub warehouse_id: Option<String>,
    /// Restrict to a set of product ids.
    pub product_ids: Option<Vec<String>>,
}

impl SyncFilters {
    /// Filters that match everything.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Check whether any filter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.warehouse_id.is_none() && self.product_ids.is_none()
    }
}
