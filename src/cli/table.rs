//! Table rendering for previews, listings and error breakdowns

use chrono::Local;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{display_row, truncate_str};
use crate::core::{LedgerInfo, PlaceField, PlaceId, Record};
use crate::pipeline::{ChangeSet, ChangeSetEntry, FieldMapping, RowError, ValidationResult};

fn render(builder: Builder) -> String {
    builder.build().with(Style::rounded()).to_string()
}

fn cell(record: &Record, field: PlaceField) -> String {
    record.get(&field).map(|v| v.to_cell()).unwrap_or_default()
}

/// Per-row error breakdown
pub fn errors(errors: &[RowError]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Row", "Field", "Message"]);
    for e in errors {
        builder.push_record([
            display_row(e.row).to_string(),
            e.field.map(|f| f.to_string()).unwrap_or_else(|| "-".into()),
            e.message.clone(),
        ]);
    }
    render(builder)
}

/// Validation failures of the rows that have any
pub fn validation(results: &[ValidationResult]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Row", "Errors"]);
    for result in results.iter().filter(|r| !r.is_valid()) {
        builder.push_record([
            display_row(result.row_index).to_string(),
            result.errors.join("; "),
        ]);
    }
    render(builder)
}

/// Which source column feeds each canonical field
pub fn mapping(mapping: &FieldMapping) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Source column", "Required"]);
    for &field in PlaceField::all() {
        builder.push_record([
            field.to_string(),
            mapping.source_for(field).unwrap_or("-").to_string(),
            if field.is_required() { "yes" } else { "" }.to_string(),
        ]);
    }
    render(builder)
}

/// Planned entries, at most `limit` of them
pub fn plan(plan: &ChangeSet, limit: usize) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Row", "Action", "Record", "Fields"]);
    for planned in plan.entries.iter().take(limit) {
        let (target, fields) = match &planned.entry {
            ChangeSetEntry::Create { fields } => ("(new)".to_string(), field_list(fields)),
            ChangeSetEntry::Update { id, changed, .. } => (id.to_string(), field_list(changed)),
            ChangeSetEntry::Delete { id } => (id.to_string(), String::new()),
        };
        builder.push_record([
            display_row(planned.row_index).to_string(),
            planned.entry.verb().to_string(),
            target,
            truncate_str(&fields, 60),
        ]);
    }
    render(builder)
}

fn field_list(record: &Record) -> String {
    record
        .keys()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Stored places
pub fn places(records: &[(PlaceId, Record)]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["ID", "Name", "Type", "City", "Country"]);
    for (id, record) in records {
        builder.push_record([
            id.to_string(),
            truncate_str(&cell(record, PlaceField::Name), 40),
            cell(record, PlaceField::Type),
            cell(record, PlaceField::City),
            cell(record, PlaceField::Country),
        ]);
    }
    render(builder)
}

/// Pending rollback ledgers
pub fn ledgers(infos: &[LedgerInfo]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Job", "Kind", "Source", "When", "Created", "Updated"]);
    for info in infos {
        builder.push_record([
            info.job_id.to_string(),
            info.kind.to_string(),
            truncate_str(&info.source, 40),
            info.created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
            info.created.to_string(),
            info.updated.to_string(),
        ]);
    }
    render(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FieldValue;
    use crate::pipeline::PlannedEntry;

    #[test]
    fn test_errors_table_uses_display_rows() {
        let out = errors(&[RowError::new(0, Some(PlaceField::City), "city is required")]);
        assert!(out.contains("city is required"));
        assert!(out.contains("│ 1 "));
    }

    #[test]
    fn test_plan_table_lists_changed_fields() {
        let id = PlaceId::new();
        let set = ChangeSet {
            entries: vec![PlannedEntry {
                row_index: 4,
                entry: ChangeSetEntry::Update {
                    id,
                    changed: Record::from([(PlaceField::City, FieldValue::Text("Lodz".into()))]),
                    original: Record::new(),
                },
            }],
            ..Default::default()
        };
        let out = plan(&set, 10);
        assert!(out.contains("update"));
        assert!(out.contains(&id.to_string()));
        assert!(out.contains("city"));
    }
}
