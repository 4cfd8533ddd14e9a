//! Canonical place schema and typed field values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A typed place record as exchanged with the store
pub type Record = BTreeMap<PlaceField, FieldValue>;

/// Canonical place fields every source column is normalised to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceField {
    Id,
    Name,
    Type,
    Country,
    City,
    Address,
    Description,
    PriceRange,
    Website,
    ImageUrl,
    Latitude,
    Longitude,
    IsHiddenGem,
    IsFeatured,
    InsiderTip,
    MustTry,
}

/// How a field's raw text is coerced before reaching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Identifier,
    Text,
    Number,
    Flag,
}

/// Allowed values for `type`
pub const PLACE_TYPES: &[&str] = &[
    "restaurant",
    "cafe",
    "bar",
    "bakery",
    "street_food",
    "market",
    "hotel",
    "attraction",
];

/// Allowed values for `price_range`
pub const PRICE_RANGES: &[&str] = &["$", "$$", "$$$", "$$$$"];

impl PlaceField {
    /// Get the canonical key
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceField::Id => "id",
            PlaceField::Name => "name",
            PlaceField::Type => "type",
            PlaceField::Country => "country",
            PlaceField::City => "city",
            PlaceField::Address => "address",
            PlaceField::Description => "description",
            PlaceField::PriceRange => "price_range",
            PlaceField::Website => "website",
            PlaceField::ImageUrl => "image_url",
            PlaceField::Latitude => "latitude",
            PlaceField::Longitude => "longitude",
            PlaceField::IsHiddenGem => "is_hidden_gem",
            PlaceField::IsFeatured => "is_featured",
            PlaceField::InsiderTip => "insider_tip",
            PlaceField::MustTry => "must_try",
        }
    }

    /// All canonical fields in schema order
    pub fn all() -> &'static [PlaceField] {
        &[
            PlaceField::Id,
            PlaceField::Name,
            PlaceField::Type,
            PlaceField::Country,
            PlaceField::City,
            PlaceField::Address,
            PlaceField::Description,
            PlaceField::PriceRange,
            PlaceField::Website,
            PlaceField::ImageUrl,
            PlaceField::Latitude,
            PlaceField::Longitude,
            PlaceField::IsHiddenGem,
            PlaceField::IsFeatured,
            PlaceField::InsiderTip,
            PlaceField::MustTry,
        ]
    }

    /// Canonical fields that carry record content (everything except `id`)
    pub fn content() -> &'static [PlaceField] {
        &Self::all()[1..]
    }

    /// Fields that must be non-empty on every row
    pub fn required() -> &'static [PlaceField] {
        &[
            PlaceField::Name,
            PlaceField::Type,
            PlaceField::Country,
            PlaceField::City,
        ]
    }

    pub fn is_required(&self) -> bool {
        Self::required().contains(self)
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            PlaceField::Id => FieldKind::Identifier,
            PlaceField::Latitude | PlaceField::Longitude => FieldKind::Number,
            PlaceField::IsHiddenGem | PlaceField::IsFeatured => FieldKind::Flag,
            _ => FieldKind::Text,
        }
    }

    /// Allowed values for enumerated fields
    pub fn allowed_values(&self) -> Option<&'static [&'static str]> {
        match self {
            PlaceField::Type => Some(PLACE_TYPES),
            PlaceField::PriceRange => Some(PRICE_RANGES),
            _ => None,
        }
    }

    /// Inclusive numeric range for coordinate fields
    pub fn numeric_range(&self) -> Option<(f64, f64)> {
        match self {
            PlaceField::Latitude => Some((-90.0, 90.0)),
            PlaceField::Longitude => Some((-180.0, 180.0)),
            _ => None,
        }
    }
}

impl fmt::Display for PlaceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaceField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize_key(s);
        PlaceField::all()
            .iter()
            .copied()
            .find(|field| field.as_str() == key)
            .ok_or_else(|| {
                format!(
                    "unknown field '{}' (valid: {})",
                    s,
                    PlaceField::all()
                        .iter()
                        .map(|f| f.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

/// Normalise a header or field name for comparison: trimmed, lowercase,
/// spaces and hyphens folded into underscores
pub fn normalize_key(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// A typed field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Render the value as a table cell (Null becomes an empty cell)
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cell())
    }
}
