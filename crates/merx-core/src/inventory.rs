//! Inventory calculations.
//!
//! Deterministic, side-effect-free routines consumed by the sync
//! orchestrator and the bulk engine for validation and derived state.
//! Threshold and rounding rules are load-bearing: downstream systems
//! compare against the exact same numbers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stock level classification relative to the reorder point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    /// Nothing available.
    OutOfStock,
    /// Below half the reorder point.
    Critical,
    /// At or below the reorder point.
    Low,
    /// Above the reorder point.
    Normal,
}

impl StockStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::Critical => "critical",
            StockStatus::Low => "low",
            StockStatus::Normal => "normal",
        }
    }

    /// Check whether this status calls for replenishment.
    #[must_use]
    pub fn needs_reorder(&self) -> bool {
        !matches!(self, StockStatus::Normal)
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quantity actually available to sell: on hand minus reserved,
/// floored at zero.
#[must_use]
pub fn available_quantity(on_hand: i64, reserved: i64) -> i64 {
    (on_hand - reserved).max(0)
}

/// Classify available quantity against the reorder point.
///
/// Exactly half the reorder point classifies as `Low`, not `Critical`;
/// the critical band is strictly below half.
#[must_use]
pub fn stock_status(available: i64, reorder_point: i64) -> StockStatus {
    if available <= 0 {
        StockStatus::OutOfStock
    } else if 2 * available < reorder_point {
        StockStatus::Critical
    } else if available <= reorder_point {
        StockStatus::Low
    } else {
        StockStatus::Normal
    }
}

/// Suggested reorder quantity.
///
/// `base + lead_time_days * avg_daily_usage - available`, clamped at
/// zero and rounded up to the nearest 10 units.
#[must_use]
pub fn reorder_suggestion(
    base_reorder_quantity: i64,
    lead_time_days: f64,
    avg_daily_usage: f64,
    available: i64,
) -> i64 {
    let raw = base_reorder_quantity as f64 + lead_time_days * avg_daily_usage - available as f64;
    if raw <= 0.0 {
        return 0;
    }
    ((raw / 10.0).ceil() * 10.0) as i64
}

/// Safety stock: `z(service_level) * demand_std_dev * sqrt(lead_time_days)`.
#[must_use]
pub fn safety_stock(service_level: f64, demand_std_dev: f64, lead_time_days: f64) -> f64 {
    z_score(service_level) * demand_std_dev * lead_time_days.max(0.0).sqrt()
}

/// One-sided z-score for a cycle service level.
///
/// Fixed lookup table; a requested level maps to the highest tier it
/// reaches. Levels at or below 50% carry no safety stock.
#[must_use]
pub fn z_score(service_level: f64) -> f64 {
    const TIERS: &[(f64, f64)] = &[
        (0.999, 3.09),
        (0.99, 2.33),
        (0.98, 2.05),
        (0.975, 1.96),
        (0.95, 1.645),
        (0.90, 1.28),
        (0.85, 1.04),
        (0.80, 0.84),
    ];
    for (level, z) in TIERS {
        if service_level >= *level {
            return *z;
        }
    }
    0.0
}

/// Validate the quantity fields of an inventory payload: any of
/// `quantity`, `reserved`, `reorder_point` that are present must be
/// non-negative integers. Absent fields pass (partial updates omit
/// untouched fields).
pub fn validate_quantities(attributes: &serde_json::Value) -> Result<(), String> {
    let obj = attributes
        .as_object()
        .ok_or_else(|| "inventory payload must be an object".to_string())?;

    for field in ["quantity", "reserved", "reorder_point"] {
        if let Some(value) = obj.get(field) {
            let qty = value
                .as_i64()
                .ok_or_else(|| format!("field '{field}' must be an integer"))?;
            if qty < 0 {
                return Err(format!("field '{field}' must not be negative (got {qty})"));
            }
        }
    }

    Ok(())
}

/// Validate a complete inventory attribute payload: required fields
/// present, quantities non-negative integers.
pub fn validate_inventory(attributes: &serde_json::Value) -> Result<(), String> {
    let obj = attributes
        .as_object()
        .ok_or_else(|| "inventory payload must be an object".to_string())?;

    if !obj.contains_key("sku") {
        return Err("missing required field: sku".to_string());
    }
    if !obj.contains_key("quantity") {
        return Err("missing required field: quantity".to_string());
    }

    validate_quantities(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_quantity_floors_at_zero() {
        assert_eq!(available_quantity(10, 3), 7);
        assert_eq!(available_quantity(3, 10), 0);
        assert_eq!(available_quantity(0, 0), 0);
    }

    #[test]
    fn test_stock_status_thresholds() {
        // quantity 5, reorder point 10 -> low
        assert_eq!(stock_status(5, 10), StockStatus::Low);
        // quantity 5, reserved 5 -> available 0 -> out of stock
        assert_eq!(stock_status(available_quantity(5, 5), 10), StockStatus::OutOfStock);

        assert_eq!(stock_status(4, 10), StockStatus::Critical);
        assert_eq!(stock_status(10, 10), StockStatus::Low);
        assert_eq!(stock_status(11, 10), StockStatus::Normal);
        assert_eq!(stock_status(-2, 10), StockStatus::OutOfStock);
    }

    #[test]
    fn test_needs_reorder() {
        assert!(StockStatus::OutOfStock.needs_reorder());
        assert!(StockStatus::Critical.needs_reorder());
        assert!(StockStatus::Low.needs_reorder());
        assert!(!StockStatus::Normal.needs_reorder());
    }

    #[test]
    fn test_reorder_suggestion_rounds_up_to_ten() {
        // 50 + 7 * 3 - 20 = 51 -> 60
        assert_eq!(reorder_suggestion(50, 7.0, 3.0, 20), 60);
        // Exact multiple stays put: 50 + 10 - 20 = 40
        assert_eq!(reorder_suggestion(50, 5.0, 2.0, 20), 40);
        // 1 -> 10
        assert_eq!(reorder_suggestion(1, 0.0, 0.0, 0), 10);
    }

    #[test]
    fn test_reorder_suggestion_clamped_at_zero() {
        assert_eq!(reorder_suggestion(10, 1.0, 1.0, 500), 0);
        assert_eq!(reorder_suggestion(0, 0.0, 0.0, 0), 0);
    }

    #[test]
    fn test_z_score_tiers() {
        assert!((z_score(0.95) - 1.645).abs() < f64::EPSILON);
        assert!((z_score(0.96) - 1.645).abs() < f64::EPSILON);
        assert!((z_score(0.99) - 2.33).abs() < f64::EPSILON);
        assert!((z_score(0.5)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_safety_stock() {
        // 1.645 * 4 * sqrt(9) = 19.74
        let ss = safety_stock(0.95, 4.0, 9.0);
        assert!((ss - 19.74).abs() < 1e-9);
        // Zero std dev -> zero safety stock
        assert_eq!(safety_stock(0.95, 0.0, 9.0), 0.0);
    }

    #[test]
    fn test_validate_inventory_accepts_good_payload() {
        let attrs = serde_json::json!({"sku": "A-1", "quantity": 5, "reserved": 0});
        assert!(validate_inventory(&attrs).is_ok());
    }

    #[test]
    fn test_validate_inventory_rejects_negative_quantity() {
        let attrs = serde_json::json!({"sku": "A-1", "quantity": -1});
        let err = validate_inventory(&attrs).unwrap_err();
        assert!(err.contains("negative"));
    }

    #[test]
    fn test_validate_inventory_rejects_missing_fields() {
        let err = validate_inventory(&serde_json::json!({"quantity": 5})).unwrap_err();
        assert!(err.contains("sku"));

        let err = validate_inventory(&serde_json::json!({"sku": "A"})).unwrap_err();
        assert!(err.contains("quantity"));

        let err = validate_inventory(&serde_json::json!("nope")).unwrap_err();
        assert!(err.contains("object"));
    }

    #[test]
    fn test_validate_inventory_rejects_non_integer() {
        let attrs = serde_json::json!({"sku": "A-1", "quantity": "five"});
        let err = validate_inventory(&attrs).unwrap_err();
        assert!(err.contains("integer"));
    }

    #[test]
    fn test_validate_quantities_allows_partial_payloads() {
        // A partial update touching only `reserved` is fine.
        assert!(validate_quantities(&serde_json::json!({"reserved": 3})).is_ok());
        assert!(validate_quantities(&serde_json::json!({})).is_ok());

        let err = validate_quantities(&serde_json::json!({"reserved": -3})).unwrap_err();
        assert!(err.contains("negative"));
    }
}
