//! Field mapper: source column headers onto the canonical schema

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::core::field::{normalize_key, PlaceField};
use crate::core::record::{MappedRow, SourceRow};

/// Errors raised while editing a mapping
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("invalid mapping '{0}': expected field=Header")]
    InvalidOverride(String),

    #[error("{0}")]
    UnknownField(String),

    #[error("cannot map {field} to '{header}': no such column in the source")]
    UnknownHeader { field: PlaceField, header: String },
}

/// Canonical field to source header assignment for one job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldMapping {
    entries: BTreeMap<PlaceField, String>,
}

impl FieldMapping {
    /// Match canonical fields to headers by case-insensitive name
    pub fn auto(headers: &[String], fields: &[PlaceField]) -> Self {
        let mut entries = BTreeMap::new();
        for &field in fields {
            if let Some(header) = headers
                .iter()
                .find(|h| normalize_key(h) == field.as_str())
            {
                entries.insert(field, header.clone());
            }
        }
        Self { entries }
    }

    pub fn source_for(&self, field: PlaceField) -> Option<&str> {
        self.entries.get(&field).map(String::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<PlaceField, String> {
        &self.entries
    }

    /// Point a field at a header, or unmap it with `None`
    pub fn set(&mut self, field: PlaceField, header: Option<String>) {
        match header {
            Some(h) => {
                self.entries.insert(field, h);
            }
            None => {
                self.entries.remove(&field);
            }
        }
    }

    /// Apply an operator override after checking the header exists
    pub fn apply_override(
        &mut self,
        over: &MappingOverride,
        headers: &[String],
    ) -> Result<(), MappingError> {
        if let Some(header) = &over.header {
            if !headers.iter().any(|h| h == header) {
                return Err(MappingError::UnknownHeader {
                    field: over.field,
                    header: header.clone(),
                });
            }
        }
        self.set(over.field, over.header.clone());
        Ok(())
    }

    /// Canonical fields with no source column
    pub fn unmapped(&self, fields: &[PlaceField]) -> Vec<PlaceField> {
        fields
            .iter()
            .copied()
            .filter(|f| !self.entries.contains_key(f))
            .collect()
    }

    /// Source headers no canonical field reads from
    pub fn ignored_headers<'a>(&self, headers: &'a [String]) -> Vec<&'a str> {
        headers
            .iter()
            .filter(|h| !self.entries.values().any(|m| m == *h))
            .map(String::as_str)
            .collect()
    }

    /// Project one source row onto the canonical schema. Unmapped fields are
    /// left absent so "not provided" stays distinct from "explicitly empty".
    pub fn apply(&self, row: &SourceRow, row_index: usize) -> MappedRow {
        let mapped = self
            .entries
            .iter()
            .filter_map(|(field, header)| row.get(header).map(|v| (*field, v.to_string())))
            .collect();
        MappedRow::new(row_index, mapped)
    }
}

/// `auto_map(headers, canonical)`
pub fn auto_map(headers: &[String], fields: &[PlaceField]) -> FieldMapping {
    FieldMapping::auto(headers, fields)
}

/// `apply_mapping(row, mapping)`
pub fn apply_mapping(row: &SourceRow, mapping: &FieldMapping, row_index: usize) -> MappedRow {
    mapping.apply(row, row_index)
}

/// A single `field=Header` override from the operator; `field=` unmaps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingOverride {
    pub field: PlaceField,
    pub header: Option<String>,
}

impl FromStr for MappingOverride {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, header) = s
            .split_once('=')
            .ok_or_else(|| MappingError::InvalidOverride(s.to_string()))?;
        let field = field.parse::<PlaceField>().map_err(MappingError::UnknownField)?;
        let header = header.trim();
        Ok(Self {
            field,
            header: (!header.is_empty()).then(|| header.to_string()),
        })
    }
}
