//! Row records flowing through the pipeline

use std::collections::{BTreeMap, BTreeSet};

use crate::core::field::PlaceField;

/// One parsed source line: ordered header to raw cell pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    index: usize,
    cells: Vec<(String, String)>,
}

impl SourceRow {
    pub fn new(index: usize, cells: Vec<(String, String)>) -> Self {
        Self { index, cells }
    }

    /// Data-line position in the source (0-based, header excluded)
    pub fn index(&self) -> usize {
        self.index
    }

    /// Look up a cell by exact header; duplicate headers resolve to the first
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    pub fn cells(&self) -> &[(String, String)] {
        &self.cells
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.trim().is_empty())
    }
}

/// Parser output: headers in source order plus the rows beneath them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTable {
    pub headers: Vec<String>,
    pub rows: Vec<SourceRow>,
}

impl SourceTable {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() || self.rows.is_empty()
    }
}

/// The state of a single canonical field on a mapped row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell<'a> {
    /// No source column is mapped and no override exists
    Absent,
    /// Value copied from the mapped source column (may be empty)
    Mapped(&'a str),
    /// Operator hand edit; shadows the mapped value entirely
    Overridden(&'a str),
}

impl<'a> Cell<'a> {
    pub fn value(&self) -> Option<&'a str> {
        match self {
            Cell::Absent => None,
            Cell::Mapped(v) | Cell::Overridden(v) => Some(v),
        }
    }

    /// True when the cell holds something other than whitespace
    pub fn is_filled(&self) -> bool {
        self.value().is_some_and(|v| !v.trim().is_empty())
    }
}

/// A source row projected onto the canonical schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedRow {
    /// Stable position in the original source (0-based, header excluded)
    pub row_index: usize,
    mapped: BTreeMap<PlaceField, String>,
    overrides: BTreeMap<PlaceField, String>,
    enriched: BTreeMap<PlaceField, String>,
}

impl MappedRow {
    pub fn new(row_index: usize, mapped: BTreeMap<PlaceField, String>) -> Self {
        Self {
            row_index,
            mapped,
            ..Default::default()
        }
    }

    /// Current canonical cell: override, else mapped value, else absent
    pub fn cell(&self, field: PlaceField) -> Cell<'_> {
        if let Some(v) = self.overrides.get(&field) {
            Cell::Overridden(v)
        } else if let Some(v) = self.mapped.get(&field) {
            Cell::Mapped(v)
        } else {
            Cell::Absent
        }
    }

    pub fn value(&self, field: PlaceField) -> Option<&str> {
        self.cell(field).value()
    }

    pub fn mapped(&self) -> &BTreeMap<PlaceField, String> {
        &self.mapped
    }

    pub fn overrides(&self) -> &BTreeMap<PlaceField, String> {
        &self.overrides
    }

    pub fn enriched(&self) -> &BTreeMap<PlaceField, String> {
        &self.enriched
    }

    /// Replace the mapped layer after a mapping change; overrides survive
    pub fn remap(&mut self, mapped: BTreeMap<PlaceField, String>) {
        self.mapped = mapped;
    }

    pub fn set_override(&mut self, field: PlaceField, value: impl Into<String>) {
        self.overrides.insert(field, value.into());
    }

    pub fn clear_override(&mut self, field: PlaceField) -> Option<String> {
        self.overrides.remove(&field)
    }

    /// Fill fields from an enrichment lookup. Only fields that are currently
    /// empty and not overridden are taken; returns the fields actually filled.
    pub fn apply_enrichment(
        &mut self,
        values: BTreeMap<PlaceField, String>,
    ) -> BTreeSet<PlaceField> {
        let mut filled = BTreeSet::new();
        for (field, value) in values {
            if field == PlaceField::Id || value.trim().is_empty() {
                continue;
            }
            // An override, even an empty one, is the operator's final word
            if matches!(self.cell(field), Cell::Overridden(_)) || self.cell(field).is_filled() {
                continue;
            }
            self.enriched.insert(field, value);
            filled.insert(field);
        }
        filled
    }

    /// Value used to build the outgoing record: override, then non-empty
    /// mapped value, then enrichment
    pub fn merged_value(&self, field: PlaceField) -> Option<&str> {
        match self.cell(field) {
            Cell::Overridden(v) => Some(v),
            Cell::Mapped(v) if !v.trim().is_empty() => Some(v),
            cell => self
                .enriched
                .get(&field)
                .map(String::as_str)
                .or(cell.value()),
        }
    }

    /// Non-empty merged values, keyed by field
    pub fn filled_values(&self) -> BTreeMap<PlaceField, String> {
        PlaceField::all()
            .iter()
            .filter_map(|&field| {
                self.merged_value(field)
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (field, v.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(PlaceField, &str)]) -> MappedRow {
        MappedRow::new(
            0,
            pairs.iter().map(|(f, v)| (*f, v.to_string())).collect(),
        )
    }

    #[test]
    fn test_source_row_first_duplicate_wins() {
        let r = SourceRow::new(0, vec![
            ("name".into(), "first".into()),
            ("name".into(), "second".into()),
        ]);
        assert_eq!(r.get("name"), Some("first"));
        assert_eq!(r.get("city"), None);
    }

    #[test]
    fn test_cell_tristate() {
        let mut r = row(&[(PlaceField::Name, "Cafe"), (PlaceField::City, "")]);
        assert_eq!(r.cell(PlaceField::Name), Cell::Mapped("Cafe"));
        assert_eq!(r.cell(PlaceField::City), Cell::Mapped(""));
        assert_eq!(r.cell(PlaceField::Country), Cell::Absent);

        r.set_override(PlaceField::City, "Krakow");
        assert_eq!(r.cell(PlaceField::City), Cell::Overridden("Krakow"));
    }

    #[test]
    fn test_empty_override_shadows_mapped_value() {
        let mut r = row(&[(PlaceField::Name, "Cafe")]);
        r.set_override(PlaceField::Name, "");
        assert_eq!(r.value(PlaceField::Name), Some(""));
        assert_eq!(r.merged_value(PlaceField::Name), Some(""));

        r.clear_override(PlaceField::Name);
        assert_eq!(r.value(PlaceField::Name), Some("Cafe"));
    }

    #[test]
    fn test_enrichment_never_overwrites_filled_fields() {
        let mut r = row(&[(PlaceField::Name, "Cafe"), (PlaceField::Address, " ")]);
        r.set_override(PlaceField::Website, "https://mine.example");

        let filled = r.apply_enrichment(BTreeMap::from([
            (PlaceField::Name, "Other".to_string()),
            (PlaceField::Website, "https://theirs.example".to_string()),
            (PlaceField::Address, "Rynek 1".to_string()),
            (PlaceField::Latitude, "50.06".to_string()),
        ]));

        assert_eq!(
            filled,
            BTreeSet::from([PlaceField::Address, PlaceField::Latitude])
        );
        assert_eq!(r.merged_value(PlaceField::Name), Some("Cafe"));
        assert_eq!(r.merged_value(PlaceField::Website), Some("https://mine.example"));
        assert_eq!(r.merged_value(PlaceField::Address), Some("Rynek 1"));
        // Enrichment does not change what validation sees
        assert_eq!(r.value(PlaceField::Latitude), None);
    }

    #[test]
    fn test_enrichment_skips_emptied_override() {
        let mut r = row(&[(PlaceField::Name, "Cafe"), (PlaceField::Address, "Old St 2")]);
        r.set_override(PlaceField::Address, "");

        let filled = r.apply_enrichment(BTreeMap::from([
            (PlaceField::Address, "Rynek 1".to_string()),
            (PlaceField::City, "Krakow".to_string()),
        ]));

        assert_eq!(filled, BTreeSet::from([PlaceField::City]));
        assert!(!r.enriched().contains_key(&PlaceField::Address));
        assert_eq!(r.merged_value(PlaceField::Address), Some(""));
        assert!(!r.filled_values().contains_key(&PlaceField::Address));
    }

    #[test]
    fn test_remap_keeps_overrides() {
        let mut r = row(&[(PlaceField::Name, "Cafe")]);
        r.set_override(PlaceField::City, "Warsaw");
        r.remap(BTreeMap::from([(PlaceField::Name, "Bar".to_string())]));
        assert_eq!(r.value(PlaceField::Name), Some("Bar"));
        assert_eq!(r.value(PlaceField::City), Some("Warsaw"));
    }
}
