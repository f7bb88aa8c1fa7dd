//! Built-in resolution strategies.

use crate::conflict::{ConflictSource, DataConflict};

use super::{Resolution, ResolutionStrategy};

/// Accept the source with the newest timestamp.
///
/// Identical timestamps resolve to the lexically smallest system name
/// so the outcome never depends on source order.
pub struct LastWriteWins;

impl ResolutionStrategy for LastWriteWins {
    fn name(&self) -> &'static str {
        "last_write_wins"
    }

    fn resolve(&self, conflict: &DataConflict) -> Result<Resolution, String> {
        let winner = conflict
            .sources
            .iter()
            .reduce(|best, s| {
                if s.timestamp > best.timestamp
                    || (s.timestamp == best.timestamp && s.system < best.system)
                {
                    s
                } else {
                    best
                }
            })
            .ok_or_else(|| "conflict has no sources".to_string())?;

        Ok(Resolution::accept(
            conflict.id,
            &winner.system,
            winner.data.clone(),
            format!(
                "last write wins: accepted '{}' updated at {}",
                winner.system,
                winner.timestamp.to_rfc3339()
            ),
        ))
    }
}

/// Field-level merge: for every attribute across all sources, the
/// first non-null, non-empty value in source order wins. Timestamps
/// are deliberately ignored.
pub struct FieldMerge;

fn is_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    }
}

impl ResolutionStrategy for FieldMerge {
    fn name(&self) -> &'static str {
        "field_merge"
    }

    fn resolve(&self, conflict: &DataConflict) -> Result<Resolution, String> {
        let mut merged = serde_json::Map::new();
        for source in &conflict.sources {
            if let Some(obj) = source.data.as_object() {
                for (key, value) in obj {
                    if is_empty_value(value) {
                        continue;
                    }
                    merged.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
        }

        Ok(Resolution::merge(
            conflict.id,
            serde_json::Value::Object(merged),
            format!(
                "field-level merge of {} sources, first non-empty value per field",
                conflict.sources.len()
            ),
        ))
    }
}

/// Always route to manual review. Used for missing references, where
/// fabricating the referenced data automatically is out of scope.
pub struct AlwaysManual;

impl ResolutionStrategy for AlwaysManual {
    fn name(&self) -> &'static str {
        "manual_review"
    }

    fn resolve(&self, conflict: &DataConflict) -> Result<Resolution, String> {
        Ok(Resolution::manual(
            conflict.id,
            format!(
                "{} conflict cannot be resolved automatically",
                conflict.conflict_type
            ),
        ))
    }
}

/// Accept the first candidate source. Callers supply only candidates
/// that already passed validation, so no validation is re-run here.
pub struct AcceptFirst;

impl ResolutionStrategy for AcceptFirst {
    fn name(&self) -> &'static str {
        "accept_first"
    }

    fn resolve(&self, conflict: &DataConflict) -> Result<Resolution, String> {
        let first = conflict
            .sources
            .first()
            .ok_or_else(|| "conflict has no sources".to_string())?;
        Ok(Resolution::accept(
            conflict.id,
            &first.system,
            first.data.clone(),
            format!("accepted first candidate source '{}'", first.system),
        ))
    }
}

/// Accept the first source found on a fixed precedence list of systems
/// (e.g. ERP before storefront). For use by custom rules.
pub struct MasterDataPriority {
    precedence: Vec<String>,
}

impl MasterDataPriority {
    /// Create with the given precedence, most authoritative first.
    pub fn new(precedence: Vec<String>) -> Self {
        Self { precedence }
    }
}

impl ResolutionStrategy for MasterDataPriority {
    fn name(&self) -> &'static str {
        "master_data_priority"
    }

    fn resolve(&self, conflict: &DataConflict) -> Result<Resolution, String> {
        for system in &self.precedence {
            if let Some(source) = conflict.source(system) {
                return Ok(Resolution::accept(
                    conflict.id,
                    system,
                    source.data.clone(),
                    format!("master data priority: '{system}' is authoritative"),
                ));
            }
        }
        Err(format!(
            "no conflict source matches the precedence list {:?}",
            self.precedence
        ))
    }
}

/// Recursive object merge. Sources are applied oldest to newest; a
/// newer source's non-null leaves override, while null or absent
/// leaves fall back to the older value. For use by custom rules.
pub struct DeepMerge;

fn deep_overlay(base: serde_json::Value, over: &serde_json::Value) -> serde_json::Value {
    match (base, over) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(over_map)) => {
            for (key, value) in over_map {
                if value.is_null() {
                    continue;
                }
                let merged = match base_map.remove(key) {
                    Some(existing) => deep_overlay(existing, value),
                    None => value.clone(),
                };
                base_map.insert(key.clone(), merged);
            }
            serde_json::Value::Object(base_map)
        }
        (base, over) => {
            if over.is_null() {
                base
            } else {
                over.clone()
            }
        }
    }
}

impl ResolutionStrategy for DeepMerge {
    fn name(&self) -> &'static str {
        "deep_merge"
    }

    fn resolve(&self, conflict: &DataConflict) -> Result<Resolution, String> {
        let mut ordered: Vec<&ConflictSource> = conflict.sources.iter().collect();
        ordered.sort_by_key(|s| s.timestamp);

        let mut merged = serde_json::Value::Object(serde_json::Map::new());
        for source in &ordered {
            merged = deep_overlay(merged, &source.data);
        }

        let newest = ordered
            .last()
            .ok_or_else(|| "conflict has no sources".to_string())?;
        Ok(Resolution::merge(
            conflict.id,
            merged,
            format!(
                "deep merge, newest source '{}' overrides non-null leaves",
                newest.system
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictType;
    use crate::resolver::ResolutionAction;
    use chrono::{Duration, Utc};
    use merx_core::EntityKind;

    fn conflict_with(sources: Vec<ConflictSource>) -> DataConflict {
        DataConflict::new(EntityKind::Product, "p-1", ConflictType::ValueMismatch, sources)
    }

    #[test]
    fn test_last_write_wins_picks_newest() {
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(60);
        let conflict = conflict_with(vec![
            ConflictSource::new("erp", t1, serde_json::json!({"price": 10})),
            ConflictSource::new("shopline", t2, serde_json::json!({"price": 12})),
        ]);

        let resolution = LastWriteWins.resolve(&conflict).unwrap();
        assert_eq!(resolution.action, ResolutionAction::AcceptSource);
        assert_eq!(resolution.winning_system.as_deref(), Some("shopline"));
        assert!(resolution.reason.contains("last write"));
    }

    #[test]
    fn test_last_write_wins_tie_breaks_on_system_name() {
        let t = Utc::now();
        let conflict = conflict_with(vec![
            ConflictSource::new("shopline", t, serde_json::json!({"price": 12})),
            ConflictSource::new("erp", t, serde_json::json!({"price": 10})),
        ]);

        // Lexically smallest system name wins regardless of order.
        let resolution = LastWriteWins.resolve(&conflict).unwrap();
        assert_eq!(resolution.winning_system.as_deref(), Some("erp"));

        let reversed = conflict_with(vec![
            ConflictSource::new("erp", t, serde_json::json!({"price": 10})),
            ConflictSource::new("shopline", t, serde_json::json!({"price": 12})),
        ]);
        let resolution = LastWriteWins.resolve(&reversed).unwrap();
        assert_eq!(resolution.winning_system.as_deref(), Some("erp"));
    }

    #[test]
    fn test_field_merge_prefers_first_non_empty() {
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(60);
        // The second source is newer, but field merge ignores time.
        let conflict = conflict_with(vec![
            ConflictSource::new(
                "erp",
                t1,
                serde_json::json!({"name": "Widget", "color": null, "size": ""}),
            ),
            ConflictSource::new(
                "shopline",
                t2,
                serde_json::json!({"name": "Widget Pro", "color": "red", "size": "L"}),
            ),
        ]);

        let resolution = FieldMerge.resolve(&conflict).unwrap();
        assert_eq!(resolution.action, ResolutionAction::Merge);
        let payload = resolution.payload.unwrap();
        assert_eq!(payload["name"], "Widget");
        assert_eq!(payload["color"], "red");
        assert_eq!(payload["size"], "L");
    }

    #[test]
    fn test_accept_first() {
        let conflict = conflict_with(vec![
            ConflictSource::new("erp", Utc::now(), serde_json::json!({"price": 10})),
            ConflictSource::new("shopline", Utc::now(), serde_json::json!({"price": 12})),
        ]);
        let resolution = AcceptFirst.resolve(&conflict).unwrap();
        assert_eq!(resolution.winning_system.as_deref(), Some("erp"));
    }

    #[test]
    fn test_always_manual() {
        let conflict = conflict_with(vec![ConflictSource::new(
            "erp",
            Utc::now(),
            serde_json::json!({}),
        )]);
        let resolution = AlwaysManual.resolve(&conflict).unwrap();
        assert_eq!(resolution.action, ResolutionAction::ManualReview);
    }

    #[test]
    fn test_master_data_priority() {
        let conflict = conflict_with(vec![
            ConflictSource::new("shopline", Utc::now(), serde_json::json!({"price": 12})),
            ConflictSource::new("erp", Utc::now(), serde_json::json!({"price": 10})),
        ]);

        let strategy = MasterDataPriority::new(vec!["erp".to_string(), "shopline".to_string()]);
        let resolution = strategy.resolve(&conflict).unwrap();
        assert_eq!(resolution.winning_system.as_deref(), Some("erp"));

        let strategy = MasterDataPriority::new(vec!["netsuite".to_string()]);
        assert!(strategy.resolve(&conflict).is_err());
    }

    #[test]
    fn test_deep_merge_newest_overrides_null_falls_back() {
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(60);
        let conflict = conflict_with(vec![
            ConflictSource::new(
                "erp",
                t1,
                serde_json::json!({
                    "name": "Widget",
                    "dimensions": {"width": 10, "height": 20}
                }),
            ),
            ConflictSource::new(
                "shopline",
                t2,
                serde_json::json!({
                    "name": "Widget Pro",
                    "dimensions": {"width": 12, "height": null}
                }),
            ),
        ]);

        let resolution = DeepMerge.resolve(&conflict).unwrap();
        let payload = resolution.payload.unwrap();
        assert_eq!(payload["name"], "Widget Pro");
        assert_eq!(payload["dimensions"]["width"], 12);
        // Null in the newer source falls back to the older value.
        assert_eq!(payload["dimensions"]["height"], 20);
        assert!(resolution.reason.contains("shopline"));
    }

    #[test]
    fn test_empty_conflict_errors() {
        let conflict = conflict_with(vec![]);
        assert!(LastWriteWins.resolve(&conflict).is_err());
        assert!(AcceptFirst.resolve(&conflict).is_err());
        assert!(DeepMerge.resolve(&conflict).is_err());
    }
}
