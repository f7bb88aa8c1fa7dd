//! Custom resolution rules.

use merx_core::EntityKind;

use crate::conflict::{ConflictType, DataConflict};

use super::Resolution;

type Condition = Box<dyn Fn(&DataConflict) -> bool + Send + Sync>;
type Resolver = Box<dyn Fn(&DataConflict) -> Result<Resolution, String> + Send + Sync>;

/// An ordered, predicate-guarded resolution rule.
///
/// Rules are evaluated in descending priority, registration order
/// within equal priority. The first rule whose entity and conflict
/// type match and whose condition holds is applied; evaluation stops
/// there.
pub struct ResolutionRule {
    /// Rule name, surfaced in resolution reasons and logs.
    pub name: String,
    /// Entity the rule applies to; `None` matches every kind.
    pub entity: Option<EntityKind>,
    /// Conflict type the rule applies to.
    pub conflict_type: ConflictType,
    /// Evaluation priority; higher runs first.
    pub priority: i32,
    condition: Condition,
    resolver: Resolver,
}

impl ResolutionRule {
    /// Create a rule matching any entity of the given conflict type.
    pub fn new<C, R>(
        name: impl Into<String>,
        conflict_type: ConflictType,
        priority: i32,
        condition: C,
        resolver: R,
    ) -> Self
    where
        C: Fn(&DataConflict) -> bool + Send + Sync + 'static,
        R: Fn(&DataConflict) -> Result<Resolution, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            entity: None,
            conflict_type,
            priority,
            condition: Box::new(condition),
            resolver: Box::new(resolver),
        }
    }

    /// Restrict the rule to one entity kind.
    #[must_use]
    pub fn for_entity(mut self, entity: EntityKind) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Check whether this rule applies to the conflict.
    #[must_use]
    pub fn matches(&self, conflict: &DataConflict) -> bool {
        if self.conflict_type != conflict.conflict_type {
            return false;
        }
        if let Some(entity) = self.entity {
            if entity != conflict.entity {
                return false;
            }
        }
        (self.condition)(conflict)
    }

    /// Apply the rule's resolver.
    pub fn apply(&self, conflict: &DataConflict) -> Result<Resolution, String> {
        (self.resolver)(conflict)
    }
}

impl std::fmt::Debug for ResolutionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionRule")
            .field("name", &self.name)
            .field("entity", &self.entity)
            .field("conflict_type", &self.conflict_type)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictSource;
    use chrono::Utc;

    fn conflict(entity: EntityKind, conflict_type: ConflictType) -> DataConflict {
        DataConflict::new(
            entity,
            "p-1",
            conflict_type,
            vec![ConflictSource::new(
                "erp",
                Utc::now(),
                serde_json::json!({"price": 10}),
            )],
        )
    }

    #[test]
    fn test_rule_matches_type_and_entity() {
        let rule = ResolutionRule::new(
            "erp-wins-on-price",
            ConflictType::ValueMismatch,
            100,
            |_| true,
            |c| Ok(Resolution::manual(c.id, "test")),
        )
        .for_entity(EntityKind::Price);

        assert!(rule.matches(&conflict(EntityKind::Price, ConflictType::ValueMismatch)));
        assert!(!rule.matches(&conflict(EntityKind::Product, ConflictType::ValueMismatch)));
        assert!(!rule.matches(&conflict(EntityKind::Price, ConflictType::Duplicate)));
    }

    #[test]
    fn test_rule_condition_gates_match() {
        let rule = ResolutionRule::new(
            "only-with-erp-source",
            ConflictType::ValueMismatch,
            0,
            |c| c.source("erp").is_some(),
            |c| Ok(Resolution::manual(c.id, "test")),
        );

        assert!(rule.matches(&conflict(EntityKind::Product, ConflictType::ValueMismatch)));

        let no_erp = DataConflict::new(
            EntityKind::Product,
            "p-2",
            ConflictType::ValueMismatch,
            vec![ConflictSource::new(
                "shopline",
                Utc::now(),
                serde_json::json!({}),
            )],
        );
        assert!(!rule.matches(&no_erp));
    }

    #[test]
    fn test_any_entity_rule() {
        let rule = ResolutionRule::new(
            "catch-all",
            ConflictType::Duplicate,
            0,
            |_| true,
            |c| Ok(Resolution::manual(c.id, "test")),
        );
        assert!(rule.matches(&conflict(EntityKind::Product, ConflictType::Duplicate)));
        assert!(rule.matches(&conflict(EntityKind::Order, ConflictType::Duplicate)));
    }
}
