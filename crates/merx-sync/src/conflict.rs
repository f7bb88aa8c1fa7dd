//! Conflict model and detection.
//!
//! Detection is pure: given the stored record and the incoming mapped
//! record it either produces a [`DataConflict`] or decides the write
//! can proceed (or be skipped) without one. All side effects stay in
//! the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use merx_connector::ExternalRecord;
use merx_core::{EntityKind, StoredRecord};

/// Source label used for the internal store's side of a conflict.
pub const INTERNAL_SYSTEM: &str = "internal";

/// Kind of divergence detected between data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// The same entity carries different values in different systems.
    ValueMismatch,
    /// Two sources claim the same logical entity.
    Duplicate,
    /// A record references data that does not exist internally.
    MissingReference,
    /// A source failed validation and candidates must be arbitrated.
    ValidationError,
}

impl ConflictType {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::ValueMismatch => "value_mismatch",
            ConflictType::Duplicate => "duplicate",
            ConflictType::MissingReference => "missing_reference",
            ConflictType::ValidationError => "validation_error",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConflictType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "value_mismatch" => Ok(ConflictType::ValueMismatch),
            "duplicate" => Ok(ConflictType::Duplicate),
            "missing_reference" => Ok(ConflictType::MissingReference),
            "validation_error" => Ok(ConflictType::ValidationError),
            _ => Err(format!("Unknown conflict type: {s}")),
        }
    }
}

/// One origin's view of the conflicted entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictSource {
    /// Origin system name.
    pub system: String,
    /// When the origin last modified the entity.
    pub timestamp: DateTime<Utc>,
    /// The origin's raw payload.
    pub data: serde_json::Value,
}

impl ConflictSource {
    /// Create a new source.
    pub fn new(
        system: impl Into<String>,
        timestamp: DateTime<Utc>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            system: system.into(),
            timestamp,
            data,
        }
    }
}

/// A detected divergence for one internal entity across two or more
/// sources.
///
/// Consumed whole by the resolver: a conflict is never partially
/// resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConflict {
    /// Conflict id.
    pub id: Uuid,
    /// Entity kind.
    pub entity: EntityKind,
    /// Internal entity id.
    pub entity_id: String,
    /// Kind of divergence.
    pub conflict_type: ConflictType,
    /// Attribute names that differ between the sources.
    pub fields: Vec<String>,
    /// The sources, in detection order.
    pub sources: Vec<ConflictSource>,
}

impl DataConflict {
    /// Create a new conflict.
    pub fn new(
        entity: EntityKind,
        entity_id: impl Into<String>,
        conflict_type: ConflictType,
        sources: Vec<ConflictSource>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity,
            entity_id: entity_id.into(),
            conflict_type,
            fields: Vec::new(),
            sources,
        }
    }

    /// Set the differing field names.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    /// The source reported by the given system, if present.
    #[must_use]
    pub fn source(&self, system: &str) -> Option<&ConflictSource> {
        self.sources.iter().find(|s| s.system == system)
    }
}

/// Attribute names present in `incoming` whose values differ from
/// `stored`. Attributes absent from `incoming` are not compared: most
/// platforms deliver partial payloads and an omitted field is not a
/// divergence.
#[must_use]
pub fn changed_fields(stored: &serde_json::Value, incoming: &serde_json::Value) -> Vec<String> {
    let incoming_obj = match incoming.as_object() {
        Some(o) => o,
        None => return Vec::new(),
    };

    incoming_obj
        .iter()
        .filter(|(key, value)| stored.get(key.as_str()) != Some(value))
        .map(|(key, _)| key.clone())
        .collect()
}

/// Decide whether an incoming external record conflicts with the
/// stored one.
///
/// Returns `None` when the payloads agree (the write can be skipped)
/// or when the stored record's last write came from the same external
/// system (the incoming value is a continuation of that stream, not an
/// independent divergence — the write proceeds directly). Returns a
/// `ValueMismatch` conflict only when both sides were updated
/// independently.
#[must_use]
pub fn detect_value_conflict(
    entity: EntityKind,
    internal_id: &str,
    stored: &StoredRecord,
    incoming: &ExternalRecord,
    source_system: &str,
) -> Option<DataConflict> {
    let fields = changed_fields(&stored.attributes, &incoming.attributes);
    if fields.is_empty() {
        return None;
    }
    if stored.last_written_by(source_system) {
        return None;
    }

    let incoming_at = incoming.updated_at.unwrap_or_else(Utc::now);
    let sources = vec![
        ConflictSource::new(INTERNAL_SYSTEM, stored.updated_at, stored.attributes.clone()),
        ConflictSource::new(source_system, incoming_at, incoming.attributes.clone()),
    ];

    Some(
        DataConflict::new(entity, internal_id, ConflictType::ValueMismatch, sources)
            .with_fields(fields),
    )
}
