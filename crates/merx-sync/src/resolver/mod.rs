//! Conflict resolution engine.
//!
//! Resolution is rule-first, strategy-second, manual-review-fallback:
//! custom [`ResolutionRule`]s are consulted in descending priority;
//! when none matches, the default strategy registered for the conflict
//! type applies; when that cannot decide either, the conflict goes to
//! manual review. Conflicts are never silently dropped.

pub mod rules;
pub mod strategies;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::conflict::{ConflictType, DataConflict};

pub use rules::ResolutionRule;
pub use strategies::{
    AcceptFirst, AlwaysManual, DeepMerge, FieldMerge, LastWriteWins, MasterDataPriority,
};

/// What a resolution does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// One source's payload is accepted as-is.
    AcceptSource,
    /// A merged payload combining the sources is written.
    Merge,
    /// No automatic decision; a human must intervene.
    ManualReview,
}

impl ResolutionAction {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionAction::AcceptSource => "accept_source",
            ResolutionAction::Merge => "merge",
            ResolutionAction::ManualReview => "manual_review",
        }
    }
}

impl fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The resolver's decision for one conflict. Immutable once produced;
/// applied by the store writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    /// The conflict this resolution decides.
    pub conflict_id: Uuid,
    /// What to do.
    pub action: ResolutionAction,
    /// The winning source system, for `AcceptSource`.
    pub winning_system: Option<String>,
    /// The payload to write, for `AcceptSource` and `Merge`.
    pub payload: Option<serde_json::Value>,
    /// Human-readable explanation of the decision.
    pub reason: String,
}

impl Resolution {
    /// Accept one source's payload.
    pub fn accept(
        conflict_id: Uuid,
        system: impl Into<String>,
        payload: serde_json::Value,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            conflict_id,
            action: ResolutionAction::AcceptSource,
            winning_system: Some(system.into()),
            payload: Some(payload),
            reason: reason.into(),
        }
    }

    /// Write a merged payload.
    pub fn merge(conflict_id: Uuid, payload: serde_json::Value, reason: impl Into<String>) -> Self {
        Self {
            conflict_id,
            action: ResolutionAction::Merge,
            winning_system: None,
            payload: Some(payload),
            reason: reason.into(),
        }
    }

    /// Defer to a human.
    pub fn manual(conflict_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            conflict_id,
            action: ResolutionAction::ManualReview,
            winning_system: None,
            payload: None,
            reason: reason.into(),
        }
    }

    /// Check whether this resolution requires manual intervention.
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.action == ResolutionAction::ManualReview
    }
}

/// A strategy resolving one conflict type.
///
/// Strategies are pure: they inspect the conflict and produce a
/// decision, or an error message when they cannot decide (which the
/// resolver downgrades to manual review).
pub trait ResolutionStrategy: Send + Sync {
    /// Strategy name, surfaced in logs.
    fn name(&self) -> &'static str;

    /// Decide the conflict.
    fn resolve(&self, conflict: &DataConflict) -> Result<Resolution, String>;
}

/// The rule/strategy dispatch engine.
pub struct ConflictResolver {
    /// Custom rules, kept sorted by descending priority; registration
    /// order breaks ties (stable sort).
    rules: Vec<ResolutionRule>,
    /// Default strategy per conflict type.
    strategies: HashMap<ConflictType, Arc<dyn ResolutionStrategy>>,
}

impl ConflictResolver {
    /// Create a resolver with the default strategy registry.
    #[must_use]
    pub fn new() -> Self {
        let mut strategies: HashMap<ConflictType, Arc<dyn ResolutionStrategy>> = HashMap::new();
        strategies.insert(ConflictType::ValueMismatch, Arc::new(LastWriteWins));
        strategies.insert(ConflictType::Duplicate, Arc::new(FieldMerge));
        strategies.insert(ConflictType::MissingReference, Arc::new(AlwaysManual));
        strategies.insert(ConflictType::ValidationError, Arc::new(AcceptFirst));
        Self {
            rules: Vec::new(),
            strategies,
        }
    }

    /// Create a resolver with no default strategies registered.
    /// Everything unmatched goes to manual review.
    #[must_use]
    pub fn bare() -> Self {
        Self {
            rules: Vec::new(),
            strategies: HashMap::new(),
        }
    }

    /// Register a custom rule.
    pub fn add_rule(&mut self, rule: ResolutionRule) {
        self.rules.push(rule);
        // Stable: equal priorities keep registration order.
        self.rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
    }

    /// Register a custom rule (builder form).
    #[must_use]
    pub fn with_rule(mut self, rule: ResolutionRule) -> Self {
        self.add_rule(rule);
        self
    }

    /// Replace the default strategy for a conflict type.
    #[must_use]
    pub fn with_strategy(
        mut self,
        conflict_type: ConflictType,
        strategy: Arc<dyn ResolutionStrategy>,
    ) -> Self {
        self.strategies.insert(conflict_type, strategy);
        self
    }

    /// Resolve one conflict. Never fails: rule and strategy errors
    /// downgrade to a manual-review resolution carrying the message.
    #[must_use]
    pub fn resolve(&self, conflict: &DataConflict) -> Resolution {
        // Rules first, in priority order; first full match wins.
        for rule in &self.rules {
            if rule.matches(conflict) {
                debug!(
                    conflict_id = %conflict.id,
                    rule = %rule.name,
                    priority = rule.priority,
                    "Resolving conflict via rule"
                );
                return match rule.apply(conflict) {
                    Ok(resolution) => resolution,
                    Err(message) => {
                        warn!(
                            conflict_id = %conflict.id,
                            rule = %rule.name,
                            error = %message,
                            "Rule failed, routing conflict to manual review"
                        );
                        Resolution::manual(
                            conflict.id,
                            format!("rule '{}' failed: {message}", rule.name),
                        )
                    }
                };
            }
        }

        // Default strategy for the conflict type.
        if let Some(strategy) = self.strategies.get(&conflict.conflict_type) {
            debug!(
                conflict_id = %conflict.id,
                strategy = strategy.name(),
                "Resolving conflict via default strategy"
            );
            return match strategy.resolve(conflict) {
                Ok(resolution) => resolution,
                Err(message) => {
                    warn!(
                        conflict_id = %conflict.id,
                        strategy = strategy.name(),
                        error = %message,
                        "Strategy failed, routing conflict to manual review"
                    );
                    Resolution::manual(
                        conflict.id,
                        format!("strategy '{}' failed: {message}", strategy.name()),
                    )
                }
            };
        }

        Resolution::manual(
            conflict.id,
            format!(
                "no rule or strategy applies to {} conflict",
                conflict.conflict_type
            ),
        )
    }

    /// Resolve a batch of conflicts independently.
    ///
    /// The output has exactly the input's length and order; one
    /// conflict's failure never affects the rest.
    #[must_use]
    pub fn resolve_all(&self, conflicts: &[DataConflict]) -> Vec<Resolution> {
        conflicts.iter().map(|c| self.resolve(c)).collect()
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}
