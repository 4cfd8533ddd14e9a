//! Row validator: pure per-field rules over a mapped row
//!
//! Rules run in a fixed order per field (required, enumerated, numeric,
//! identifier) and the first failing rule is the only one reported for that
//! field. Different fields report independently.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::field::{FieldKind, PlaceField};
use crate::core::identity::PlaceId;
use crate::core::record::MappedRow;

/// Validation outcome for one row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub row_index: usize,
    /// Messages in schema field order
    pub errors: Vec<String>,
    /// The same messages keyed by field, for highlighting
    pub field_errors: BTreeMap<PlaceField, Vec<String>>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors_for(&self, field: PlaceField) -> &[String] {
        self.field_errors
            .get(&field)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn push(&mut self, field: PlaceField, message: String) {
        self.errors.push(message.clone());
        self.field_errors.entry(field).or_default().push(message);
    }
}

/// Validate mapped values under operator overrides
pub fn validate(
    mapped: &BTreeMap<PlaceField, String>,
    overrides: &BTreeMap<PlaceField, String>,
    row_index: usize,
) -> ValidationResult {
    let mut result = ValidationResult {
        row_index,
        ..Default::default()
    };

    for &field in PlaceField::all() {
        let value = overrides
            .get(&field)
            .or_else(|| mapped.get(&field))
            .map(|v| v.trim())
            .unwrap_or("");

        if let Some(message) = check_field(field, value) {
            result.push(field, message);
        }
    }

    result
}

/// Validate a row using its own overrides
pub fn validate_row(row: &MappedRow) -> ValidationResult {
    validate(row.mapped(), row.overrides(), row.row_index)
}

/// First failing rule for one field, if any
fn check_field(field: PlaceField, value: &str) -> Option<String> {
    if value.is_empty() {
        return field
            .is_required()
            .then(|| format!("{} is required", field));
    }

    if let Some(allowed) = field.allowed_values() {
        if !allowed.contains(&value) {
            return Some(format!(
                "{} '{}' is not one of: {}",
                field,
                value,
                allowed.join(", ")
            ));
        }
    }

    match field.kind() {
        FieldKind::Number => {
            let number = match value.parse::<f64>() {
                Ok(n) if n.is_finite() => n,
                _ => return Some(format!("{} '{}' is not a number", field, value)),
            };
            if let Some((min, max)) = field.numeric_range() {
                if number < min || number > max {
                    return Some(format!(
                        "{} {} is out of range ({} to {})",
                        field, value, min, max
                    ));
                }
            }
            None
        }
        FieldKind::Identifier => PlaceId::parse(value)
            .err()
            .map(|_| format!("{} '{}' is not a valid place id", field, value)),
        FieldKind::Text | FieldKind::Flag => None,
    }
}
