//! Per-entity record validation.
//!
//! Runs before any mutation is applied. Import validation demands a
//! complete record; update and delete only need the key plus sane
//! values for whatever fields are present.

use merx_core::{inventory, EntityKind};

use crate::operation::OperationType;

/// Maximum accepted email length per RFC 5321.
const MAX_EMAIL_LENGTH: usize = 254;

/// Validate an email address format.
///
/// Practical RFC 5322 basics: exactly one `@`, non-empty local part
/// and domain, a dot in the domain, no whitespace, bounded length.
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("email is empty".to_string());
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(format!(
            "email exceeds maximum length of {MAX_EMAIL_LENGTH} characters"
        ));
    }
    if email.contains(char::is_whitespace) {
        return Err("email contains whitespace".to_string());
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err("email must contain '@'".to_string());
    };
    if local.is_empty() || domain.is_empty() {
        return Err("email local part and domain must be non-empty".to_string());
    }
    if domain.contains('@') {
        return Err("email must contain exactly one '@'".to_string());
    }
    if !domain.contains('.') {
        return Err("email domain must contain at least one '.'".to_string());
    }
    if domain.starts_with('.') || domain.ends_with('.') {
        return Err("email domain cannot start or end with '.'".to_string());
    }

    Ok(())
}

fn require_fields(entity: EntityKind, attributes: &serde_json::Value) -> Result<(), String> {
    for field in entity.required_fields() {
        match attributes.get(field) {
            Some(v) if !v.is_null() => {}
            _ => return Err(format!("missing required field: {field}")),
        }
    }
    Ok(())
}

fn require_key(entity: EntityKind, attributes: &serde_json::Value) -> Result<(), String> {
    let field = entity.natural_key_field();
    match attributes.get(field) {
        Some(v) if v.as_str().is_some_and(|s| !s.is_empty()) => Ok(()),
        _ => Err(format!("missing record key field: {field}")),
    }
}

fn check_values(entity: EntityKind, attributes: &serde_json::Value) -> Result<(), String> {
    match entity {
        EntityKind::Inventory => inventory::validate_quantities(attributes),
        EntityKind::Customer => match attributes.get("email").and_then(|v| v.as_str()) {
            Some(email) => validate_email(email),
            None => Ok(()),
        },
        EntityKind::Price => match attributes.get("amount") {
            Some(v) => {
                let amount = v.as_f64().ok_or("field 'amount' must be a number")?;
                if amount < 0.0 {
                    return Err(format!("field 'amount' must not be negative (got {amount})"));
                }
                Ok(())
            }
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

/// Validate one record for the given operation.
pub fn validate_record(
    entity: EntityKind,
    operation: OperationType,
    attributes: &serde_json::Value,
) -> Result<(), String> {
    if !attributes.is_object() {
        return Err("record payload must be an object".to_string());
    }

    match operation {
        OperationType::Import => {
            require_fields(entity, attributes)?;
            check_values(entity, attributes)
        }
        OperationType::Update => {
            require_key(entity, attributes)?;
            check_values(entity, attributes)
        }
        OperationType::Delete => require_key(entity, attributes),
        OperationType::Export => Ok(()),
    }
}
