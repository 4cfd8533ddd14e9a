//! Change-set builder: mapped rows and edits into create/update/delete intents

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::core::field::{FieldKind, FieldValue, PlaceField, Record};
use crate::core::identity::PlaceId;
use crate::core::record::MappedRow;

/// Tokens accepted as `true` for flag fields (compared case-insensitively)
pub const TRUTHY_TOKENS: &[&str] = &["true", "1", "yes", "y", "да"];

/// One row-level problem, as surfaced in summaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<PlaceField>,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, field: Option<PlaceField>, message: impl Into<String>) -> Self {
        Self {
            row,
            field,
            message: message.into(),
        }
    }
}

/// A single intent against the store
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeSetEntry {
    Create {
        fields: Record,
    },
    Update {
        id: PlaceId,
        /// Only fields whose value differs from `original`
        changed: Record,
        /// Values of the changed fields before this update
        original: Record,
    },
    Delete {
        id: PlaceId,
    },
}

impl ChangeSetEntry {
    /// The record this entry targets, if it already exists
    pub fn target(&self) -> Option<PlaceId> {
        match self {
            ChangeSetEntry::Create { .. } => None,
            ChangeSetEntry::Update { id, .. } | ChangeSetEntry::Delete { id } => Some(*id),
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            ChangeSetEntry::Create { .. } => "create",
            ChangeSetEntry::Update { .. } => "update",
            ChangeSetEntry::Delete { .. } => "delete",
        }
    }
}

/// An entry tied to the source row it came from
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedEntry {
    pub row_index: usize,
    pub entry: ChangeSetEntry,
}

/// The full plan for a job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub entries: Vec<PlannedEntry>,
    /// Rows that matched their stored record exactly
    pub unchanged: usize,
    /// Rows excluded while planning
    pub errors: Vec<RowError>,
}

impl ChangeSet {
    fn count(&self, verb: &str) -> usize {
        self.entries.iter().filter(|e| e.entry.verb() == verb).count()
    }

    pub fn creates(&self) -> usize {
        self.count("create")
    }

    pub fn updates(&self) -> usize {
        self.count("update")
    }

    pub fn deletes(&self) -> usize {
        self.count("delete")
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn is_truthy(raw: &str) -> bool {
    let token = raw.trim().to_lowercase();
    TRUTHY_TOKENS.contains(&token.as_str())
}

/// Coerce raw text to the field's typed value. Blank text becomes `Null`.
pub fn coerce(field: PlaceField, raw: &str) -> FieldValue {
    let text = raw.trim();
    if text.is_empty() {
        return FieldValue::Null;
    }
    match field.kind() {
        FieldKind::Number => text
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(FieldValue::Number)
            .unwrap_or_else(|| FieldValue::Text(text.to_string())),
        FieldKind::Flag => FieldValue::Bool(is_truthy(text)),
        FieldKind::Identifier | FieldKind::Text => FieldValue::Text(text.to_string()),
    }
}

/// Parse the row's identifier; blank counts as absent
pub fn row_id(row: &MappedRow) -> Result<Option<PlaceId>, RowError> {
    match row.merged_value(PlaceField::Id).map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => PlaceId::parse(raw).map(Some).map_err(|e| {
            RowError::new(row.row_index, Some(PlaceField::Id), e.to_string())
        }),
    }
}

/// The final merged record (override, mapped, enrichment), coerced once.
/// Fields the row does not provide at all are left out.
pub fn merged_record(row: &MappedRow) -> Record {
    PlaceField::content()
        .iter()
        .filter_map(|&field| row.merged_value(field).map(|v| (field, coerce(field, v))))
        .collect()
}

/// Normalise a stored value the same way fresh input is coerced, so that
/// e.g. stored `" Cafe "` and typed `"Cafe"` compare equal
fn normalized(field: PlaceField, value: Option<&FieldValue>) -> FieldValue {
    match value {
        None | Some(FieldValue::Null) => FieldValue::Null,
        Some(FieldValue::Text(s)) => coerce(field, s),
        Some(other) => other.clone(),
    }
}

/// Fields of `current` whose value differs from `original`, with the
/// original values of exactly those fields
pub fn diff_records(original: &Record, current: &Record) -> (Record, Record) {
    let mut changed = Record::new();
    let mut before = Record::new();
    for (field, value) in current {
        let old = normalized(*field, original.get(field));
        let new = normalized(*field, Some(value));
        if old != new {
            changed.insert(*field, new);
            before.insert(
                *field,
                original.get(field).cloned().unwrap_or(FieldValue::Null),
            );
        }
    }
    (changed, before)
}

/// Build the plan for an import.
///
/// Rows without an id become creates. Rows with an id are diffed against the
/// stored record in `originals`; unchanged rows produce no entry. A repeated
/// id is an error on every row after the first.
pub fn build_import(rows: &[&MappedRow], originals: &BTreeMap<PlaceId, Record>) -> ChangeSet {
    let mut plan = ChangeSet::default();
    let mut seen = BTreeSet::new();

    for row in rows {
        let id = match row_id(row) {
            Ok(id) => id,
            Err(e) => {
                plan.errors.push(e);
                continue;
            }
        };
        let current = merged_record(row);

        let entry = match id {
            None => ChangeSetEntry::Create {
                fields: current.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            },
            Some(id) => {
                if !seen.insert(id) {
                    plan.errors.push(RowError::new(
                        row.row_index,
                        Some(PlaceField::Id),
                        format!("record {} appears more than once", id),
                    ));
                    continue;
                }
                let Some(original) = originals.get(&id) else {
                    plan.errors.push(RowError::new(
                        row.row_index,
                        Some(PlaceField::Id),
                        format!("record {} not found", id),
                    ));
                    continue;
                };
                let (changed, before) = diff_records(original, &current);
                if changed.is_empty() {
                    plan.unchanged += 1;
                    continue;
                }
                ChangeSetEntry::Update {
                    id,
                    changed,
                    original: before,
                }
            }
        };

        plan.entries.push(PlannedEntry {
            row_index: row.row_index,
            entry,
        });
    }

    plan
}

/// One row of a bulk edit session
#[derive(Debug, Clone, PartialEq)]
pub struct EditedRow {
    pub id: PlaceId,
    pub current: MappedRow,
    pub delete: bool,
}

/// Build the plan for a bulk edit.
///
/// Deleted rows become deletes; other rows become an update only when at
/// least one provided field differs from the snapshot taken at job open.
pub fn build_bulk_edit(
    rows: &[&EditedRow],
    originals: &BTreeMap<PlaceId, Record>,
    invalid: &BTreeSet<PlaceId>,
) -> ChangeSet {
    let mut plan = ChangeSet::default();

    for row in rows {
        let row_index = row.current.row_index;
        let Some(original) = originals.get(&row.id) else {
            plan.errors.push(RowError::new(
                row_index,
                Some(PlaceField::Id),
                format!("record {} is not part of this edit", row.id),
            ));
            continue;
        };

        if row.delete {
            plan.entries.push(PlannedEntry {
                row_index,
                entry: ChangeSetEntry::Delete { id: row.id },
            });
            continue;
        }
        if invalid.contains(&row.id) {
            continue;
        }

        let (changed, before) = diff_records(original, &merged_record(&row.current));
        if changed.is_empty() {
            plan.unchanged += 1;
            continue;
        }
        plan.entries.push(PlannedEntry {
            row_index,
            entry: ChangeSetEntry::Update {
                id: row.id,
                changed,
                original: before,
            },
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(index: usize, pairs: &[(PlaceField, &str)]) -> MappedRow {
        MappedRow::new(index, pairs.iter().map(|(f, v)| (*f, v.to_string())).collect())
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    #[test]
    fn test_coercion() {
        assert_eq!(coerce(PlaceField::Latitude, " 50.06 "), FieldValue::Number(50.06));
        assert_eq!(coerce(PlaceField::Latitude, "0"), FieldValue::Number(0.0));
        assert_eq!(coerce(PlaceField::Longitude, ""), FieldValue::Null);
        assert_eq!(coerce(PlaceField::IsFeatured, "Да"), FieldValue::Bool(true));
        assert_eq!(coerce(PlaceField::IsFeatured, "Y"), FieldValue::Bool(true));
        assert_eq!(coerce(PlaceField::IsHiddenGem, "no"), FieldValue::Bool(false));
        assert_eq!(coerce(PlaceField::Name, "  Cafe "), text("Cafe"));
    }

    #[test]
    fn test_rows_without_id_become_creates() {
        let a = row(0, &[(PlaceField::Name, "Cafe 1"), (PlaceField::City, "Krakow")]);
        let b = row(1, &[(PlaceField::Name, "Cafe 2"), (PlaceField::Id, "   "), (PlaceField::Website, "")]);
        let plan = build_import(&[&a, &b], &BTreeMap::new());

        assert_eq!(plan.creates(), 2);
        assert!(plan.errors.is_empty());
        let ChangeSetEntry::Create { fields } = &plan.entries[1].entry else {
            panic!("expected create");
        };
        assert!(!fields.contains_key(&PlaceField::Website));
        assert!(!fields.contains_key(&PlaceField::Id));
    }

    #[test]
    fn test_import_update_is_minimal() {
        let id = PlaceId::new();
        let original = Record::from([
            (PlaceField::Name, text("Cafe 1")),
            (PlaceField::City, text("Krakow")),
            (PlaceField::Latitude, FieldValue::Number(50.0)),
        ]);
        let r = row(
            0,
            &[
                (PlaceField::Id, &id.to_string()),
                (PlaceField::Name, "Cafe 1"),
                (PlaceField::City, "Warsaw"),
                (PlaceField::Latitude, "50"),
            ],
        );
        let plan = build_import(&[&r], &BTreeMap::from([(id, original)]));

        assert_eq!(plan.updates(), 1);
        let ChangeSetEntry::Update { changed, original, .. } = &plan.entries[0].entry else {
            panic!("expected update");
        };
        assert_eq!(changed, &Record::from([(PlaceField::City, text("Warsaw"))]));
        assert_eq!(original, &Record::from([(PlaceField::City, text("Krakow"))]));
    }

    #[test]
    fn test_import_unchanged_and_unknown_ids() {
        let known = PlaceId::new();
        let unknown = PlaceId::new();
        let originals = BTreeMap::from([(known, Record::from([(PlaceField::Name, text("A"))]))]);

        let same = row(0, &[(PlaceField::Id, &known.to_string()), (PlaceField::Name, "A")]);
        let ghost = row(1, &[(PlaceField::Id, &unknown.to_string()), (PlaceField::Name, "B")]);
        let plan = build_import(&[&same, &ghost], &originals);

        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, 1);
        assert_eq!(plan.errors.len(), 1);
        assert_eq!(plan.errors[0].row, 1);

        let again = row(2, &[(PlaceField::Id, &known.to_string()), (PlaceField::Name, "C")]);
        let plan = build_import(&[&same, &again], &originals);
        assert_eq!(plan.unchanged, 1);
        assert_eq!(plan.errors[0].message, format!("record {} appears more than once", known));
    }

    #[test]
    fn test_explicit_empty_clears_but_absent_does_not() {
        let id = PlaceId::new();
        let original = Record::from([
            (PlaceField::Name, text("A")),
            (PlaceField::Website, text("https://a.example")),
            (PlaceField::Address, text("Main St")),
        ]);
        // website mapped but blank, address not mapped at all
        let r = row(0, &[(PlaceField::Id, &id.to_string()), (PlaceField::Website, "")]);
        let plan = build_import(&[&r], &BTreeMap::from([(id, original)]));

        let ChangeSetEntry::Update { changed, .. } = &plan.entries[0].entry else {
            panic!("expected update");
        };
        assert_eq!(changed, &Record::from([(PlaceField::Website, FieldValue::Null)]));
    }

    #[test]
    fn test_enrichment_feeds_the_merged_record() {
        let mut r = row(0, &[(PlaceField::Name, "A"), (PlaceField::Latitude, "")]);
        r.apply_enrichment(BTreeMap::from([(PlaceField::Latitude, "50.5".to_string())]));
        r.set_override(PlaceField::IsFeatured, "yes");

        let record = merged_record(&r);
        assert_eq!(record.get(&PlaceField::Latitude), Some(&FieldValue::Number(50.5)));
        assert_eq!(record.get(&PlaceField::IsFeatured), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn test_diff_minimality() {
        let original = Record::from([
            (PlaceField::Name, text("Cafe")),
            (PlaceField::Latitude, FieldValue::Number(1.5)),
            (PlaceField::IsFeatured, FieldValue::Bool(false)),
            (PlaceField::Address, text(" Rynek 1 ")),
        ]);
        let current = Record::from([
            (PlaceField::Name, text("Cafe")),
            (PlaceField::Latitude, FieldValue::Number(1.5)),
            (PlaceField::IsFeatured, FieldValue::Bool(true)),
            (PlaceField::Address, text("Rynek 1")),
        ]);
        let (changed, before) = diff_records(&original, &current);
        assert_eq!(changed, Record::from([(PlaceField::IsFeatured, FieldValue::Bool(true))]));
        assert_eq!(before, Record::from([(PlaceField::IsFeatured, FieldValue::Bool(false))]));
    }

    #[test]
    fn test_bulk_edit_updates_and_deletes() {
        let mut originals = BTreeMap::new();
        let mut rows = Vec::new();
        for i in 0..10 {
            let id = PlaceId::new();
            let name = format!("Place {}", i);
            originals.insert(id, Record::from([(PlaceField::Name, text(&name))]));
            rows.push(EditedRow {
                id,
                current: row(i, &[(PlaceField::Name, &name)]),
                delete: false,
            });
        }
        rows[2].current.set_override(PlaceField::Name, "Renamed 2");
        rows[5].current.set_override(PlaceField::City, "Gdansk");
        rows[7].delete = true;
        rows[7].current.set_override(PlaceField::Name, "ignored");

        let refs: Vec<&EditedRow> = rows.iter().collect();
        let plan = build_bulk_edit(&refs, &originals, &BTreeSet::new());

        assert_eq!(plan.updates(), 2);
        assert_eq!(plan.deletes(), 1);
        assert_eq!(plan.unchanged, 7);
        let touched: Vec<usize> = plan.entries.iter().map(|e| e.row_index).collect();
        assert_eq!(touched, vec![2, 5, 7]);
    }

    #[test]
    fn test_bulk_edit_skips_invalid_rows() {
        let id = PlaceId::new();
        let originals = BTreeMap::from([(id, Record::from([(PlaceField::Name, text("A"))]))]);
        let edited = EditedRow {
            id,
            current: row(0, &[(PlaceField::Name, "")]),
            delete: false,
        };
        let plan = build_bulk_edit(&[&edited], &originals, &BTreeSet::from([id]));
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, 0);
    }
}
