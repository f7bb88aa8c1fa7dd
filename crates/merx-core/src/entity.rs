//! The fixed set of entity kinds the engine reconciles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A kind of domain entity handled by the sync and bulk engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A catalog product.
    Product,
    /// An inventory level for one product at one location.
    Inventory,
    /// A customer account.
    Customer,
    /// A sales order.
    Order,
    /// A price entry for one product.
    Price,
}

impl EntityKind {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Inventory => "inventory",
            EntityKind::Customer => "customer",
            EntityKind::Order => "order",
            EntityKind::Price => "price",
        }
    }

    /// All entity kinds, in a stable order.
    #[must_use]
    pub fn all() -> [EntityKind; 5] {
        [
            EntityKind::Product,
            EntityKind::Inventory,
            EntityKind::Customer,
            EntityKind::Order,
            EntityKind::Price,
        ]
    }

    /// The attribute that serves as this kind's natural key.
    ///
    /// Used for error reporting (a failed record is identified by its
    /// natural key, not a synthetic id) and for SKU-based auto-mapping.
    #[must_use]
    pub fn natural_key_field(&self) -> &'static str {
        match self {
            EntityKind::Product | EntityKind::Inventory | EntityKind::Price => "sku",
            EntityKind::Customer => "email",
            EntityKind::Order => "order_number",
        }
    }

    /// Attributes that must be present for a record of this kind to be
    /// accepted by validation.
    #[must_use]
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Product => &["sku", "name"],
            EntityKind::Inventory => &["sku", "quantity"],
            EntityKind::Customer => &["email"],
            EntityKind::Order => &["order_number"],
            EntityKind::Price => &["sku", "amount"],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "product" | "products" => Ok(EntityKind::Product),
            "inventory" => Ok(EntityKind::Inventory),
            "customer" | "customers" => Ok(EntityKind::Customer),
            "order" | "orders" => Ok(EntityKind::Order),
            "price" | "prices" => Ok(EntityKind::Price),
            _ => Err(format!("Unknown entity kind: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_roundtrip() {
        for kind in EntityKind::all() {
            let s = kind.as_str();
            let parsed: EntityKind = s.parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_plural_forms_parse() {
        assert_eq!("products".parse::<EntityKind>(), Ok(EntityKind::Product));
        assert_eq!("orders".parse::<EntityKind>(), Ok(EntityKind::Order));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!("warehouse".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_natural_key_fields() {
        assert_eq!(EntityKind::Product.natural_key_field(), "sku");
        assert_eq!(EntityKind::Customer.natural_key_field(), "email");
        assert_eq!(EntityKind::Order.natural_key_field(), "order_number");
    }

    #[test]
    fn test_required_fields_include_natural_key() {
        for kind in EntityKind::all() {
            assert!(kind.required_fields().contains(&kind.natural_key_field()));
        }
    }
}
