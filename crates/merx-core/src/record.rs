//! Internal store records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;

/// A record held by the internal store.
///
/// `last_source` names the external system whose write produced the
/// current value, or `None` when the record was last edited locally.
/// The conflict detector relies on it to tell a genuine divergence
/// apart from a replay of the engine's own previous write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Internal record id.
    pub id: String,
    /// JSON attribute payload.
    pub attributes: serde_json::Value,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
    /// External system that produced the last write, if any.
    pub last_source: Option<String>,
}

impl StoredRecord {
    /// Create a record last written locally.
    pub fn new(id: impl Into<String>, attributes: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            attributes,
            updated_at: Utc::now(),
            last_source: None,
        }
    }

    /// Create a record written on behalf of an external system.
    pub fn from_source(
        id: impl Into<String>,
        attributes: serde_json::Value,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            attributes,
            updated_at: Utc::now(),
            last_source: Some(source.into()),
        }
    }

    /// Check whether the last write came from the given system.
    #[must_use]
    pub fn last_written_by(&self, system: &str) -> bool {
        self.last_source.as_deref() == Some(system)
    }
}

/// Shallow overlay of a partial payload onto a base payload.
///
/// Fields present in `overlay` replace the base's; fields it omits
/// keep their base values. Non-object payloads are replaced whole.
/// Used wherever a partial update (connector page, bulk update row)
/// meets a complete stored record.
#[must_use]
pub fn overlay_attributes(
    base: serde_json::Value,
    overlay: &serde_json::Value,
) -> serde_json::Value {
    match (base, overlay) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                base_map.insert(key.clone(), value.clone());
            }
            serde_json::Value::Object(base_map)
        }
        (_, overlay) => overlay.clone(),
    }
}

/// Extract the natural key of an attribute payload for the given kind.
///
/// Returns `None` when the key attribute is absent or not a string.
#[must_use]
pub fn natural_key(kind: EntityKind, attributes: &serde_json::Value) -> Option<String> {
    attributes
        .get(kind.natural_key_field())
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
}
