//! Job aggregates: one import or bulk edit from open to commit
//!
//! Each job owns an explicit phase machine. Phases only move through
//! [`JobPhase::can_advance_to`]; anything that arrives after a job reached
//! `Committed` or `Cancelled` is rejected rather than silently applied.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use futures::future::join_all;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::field::{normalize_key, PlaceField, Record};
use crate::core::identity::{JobId, PlaceId};
use crate::core::ledger::{JobKind, LedgerError, LedgerStore, RollbackLedger};
use crate::core::record::{MappedRow, SourceTable};
use crate::core::store::{PlaceStore, StoreError};
use crate::pipeline::changeset::{
    build_bulk_edit, build_import, diff_records, is_truthy, merged_record, row_id, ChangeSet,
    EditedRow, RowError,
};
use crate::pipeline::enrich::{enrich_rows, Enricher, EnrichmentOutcome, Throttle};
use crate::pipeline::mapper::{auto_map, FieldMapping, MappingError, MappingOverride};
use crate::pipeline::reconcile::{BatchOptions, Counters, Progress, Reconciler, RunState};
use crate::pipeline::summary::RunSummary;
use crate::pipeline::validator::{validate_row, ValidationResult};

/// Column marking a row for deletion in a bulk edit file
pub const DELETE_COLUMN: &str = "_delete";

/// Where a job is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Loaded,
    Mapped,
    Validated,
    Committing,
    Committed,
    Cancelled,
}

impl JobPhase {
    pub fn can_advance_to(self, next: JobPhase) -> bool {
        use JobPhase::*;
        matches!(
            (self, next),
            (Loaded, Mapped)
                | (Mapped, Validated)
                | (Validated, Mapped)
                | (Validated, Committing)
                | (Committing, Committed)
                | (Committing, Cancelled)
        )
    }

    pub fn is_finished(self) -> bool {
        matches!(self, JobPhase::Committed | JobPhase::Cancelled)
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobPhase::Loaded => "loaded",
            JobPhase::Mapped => "mapped",
            JobPhase::Validated => "validated",
            JobPhase::Committing => "committing",
            JobPhase::Committed => "committed",
            JobPhase::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("cannot move job from {from} to {to}")]
    InvalidTransition { from: JobPhase, to: JobPhase },

    #[error("no row with index {0}")]
    UnknownRow(usize),

    #[error("record {0} is not part of this edit")]
    UnknownRecord(PlaceId),

    #[error("edit file has no 'id' column")]
    MissingIdColumn,

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("failed to write edit file: {0}")]
    Export(#[from] csv::Error),
}

fn advance(phase: &mut JobPhase, next: JobPhase) -> Result<(), JobError> {
    if !phase.can_advance_to(next) {
        return Err(JobError::InvalidTransition {
            from: *phase,
            to: next,
        });
    }
    *phase = next;
    Ok(())
}

/// Ledger persistence plus run settings shared by both job kinds
pub struct CommitContext<'a> {
    pub store: &'a dyn PlaceStore,
    pub ledgers: &'a LedgerStore,
    pub options: BatchOptions,
    pub cancel: CancellationToken,
}

/// Persist the ledger, run the plan and checkpoint after every batch
async fn commit_plan<F>(
    ctx: &CommitContext<'_>,
    mut ledger: RollbackLedger,
    plan: &ChangeSet,
    mut on_progress: F,
) -> Result<(RunSummary, Counters), JobError>
where
    F: FnMut(Progress),
{
    // Written before the first store call so an interrupted run stays undoable
    ctx.ledgers.save(&ledger)?;

    let report = Reconciler::new(ctx.store, ctx.options)
        .with_cancellation(ctx.cancel.clone())
        .run(&plan.entries, &mut ledger, |progress, ledger| {
            if let Err(e) = ctx.ledgers.save(ledger) {
                warn!(error = %e, "failed to checkpoint ledger");
            }
            on_progress(progress);
        })
        .await;

    if ledger.is_empty() {
        ctx.ledgers.discard(ledger.job_id())?;
    } else {
        ctx.ledgers.save(&ledger)?;
    }

    Ok((RunSummary::new(plan, &report, &ledger), report.counters))
}

fn validation_errors(result: &ValidationResult) -> impl Iterator<Item = RowError> + '_ {
    result.field_errors.iter().flat_map(move |(field, messages)| {
        messages
            .iter()
            .map(move |m| RowError::new(result.row_index, Some(*field), m.clone()))
    })
}

// ============================================================================
// Import
// ============================================================================

/// One import of a tabular source
pub struct ImportJob {
    id: JobId,
    source: String,
    phase: JobPhase,
    table: SourceTable,
    mapping: FieldMapping,
    rows: Vec<MappedRow>,
    validation: Vec<ValidationResult>,
    enrichment: BTreeMap<usize, EnrichmentOutcome>,
    selection: BTreeSet<usize>,
    counters: Counters,
}

impl ImportJob {
    /// Auto-map, validate, and select every valid row
    pub fn open(table: SourceTable, source: impl Into<String>) -> Result<Self, JobError> {
        let mapping = auto_map(&table.headers, PlaceField::all());
        let mut job = Self {
            id: JobId::new(),
            source: source.into(),
            phase: JobPhase::Loaded,
            table,
            mapping,
            rows: Vec::new(),
            validation: Vec::new(),
            enrichment: BTreeMap::new(),
            selection: BTreeSet::new(),
            counters: Counters::default(),
        };
        job.map_rows()?;
        job.validate_all()?;
        job.selection = job.valid_rows().collect();
        info!(job = %job.id, rows = job.rows.len(), valid = job.selection.len(), "import opened");
        Ok(job)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub fn headers(&self) -> &[String] {
        &self.table.headers
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    pub fn rows(&self) -> &[MappedRow] {
        &self.rows
    }

    pub fn validation(&self) -> &[ValidationResult] {
        &self.validation
    }

    pub fn enrichment(&self) -> &BTreeMap<usize, EnrichmentOutcome> {
        &self.enrichment
    }

    pub fn selection(&self) -> &BTreeSet<usize> {
        &self.selection
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn valid_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.validation
            .iter()
            .filter(|v| v.is_valid())
            .map(|v| v.row_index)
    }

    /// Position of a source row in `rows`. Indices follow the source, so
    /// skipped blank lines leave gaps.
    fn position(&self, row_index: usize) -> Result<usize, JobError> {
        self.rows
            .binary_search_by_key(&row_index, |row| row.row_index)
            .map_err(|_| JobError::UnknownRow(row_index))
    }

    fn map_rows(&mut self) -> Result<(), JobError> {
        advance(&mut self.phase, JobPhase::Mapped)?;
        if self.rows.is_empty() {
            self.rows = self
                .table
                .rows
                .iter()
                .map(|row| self.mapping.apply(row, row.index()))
                .collect();
        } else {
            for (row, source) in self.rows.iter_mut().zip(&self.table.rows) {
                let remapped = self.mapping.apply(source, row.row_index);
                row.remap(remapped.mapped().clone());
            }
        }
        Ok(())
    }

    fn validate_all(&mut self) -> Result<(), JobError> {
        advance(&mut self.phase, JobPhase::Validated)?;
        self.validation = self.rows.iter().map(validate_row).collect();
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), JobError> {
        if self.phase != JobPhase::Validated {
            return Err(JobError::InvalidTransition {
                from: self.phase,
                to: JobPhase::Mapped,
            });
        }
        Ok(())
    }

    /// Change mapping entries without re-parsing; rows and validation follow.
    /// The selection resets to every valid row.
    pub fn remap(&mut self, overrides: &[MappingOverride]) -> Result<(), JobError> {
        self.ensure_editable()?;
        for over in overrides {
            self.mapping.apply_override(over, &self.table.headers)?;
        }
        self.map_rows()?;
        self.validate_all()?;
        self.selection = self.valid_rows().collect();
        Ok(())
    }

    /// Operator hand edit on one row; that row is revalidated
    pub fn set_override(
        &mut self,
        row_index: usize,
        field: PlaceField,
        value: impl Into<String>,
    ) -> Result<&ValidationResult, JobError> {
        self.ensure_editable()?;
        let pos = self.position(row_index)?;
        let row = &mut self.rows[pos];
        row.set_override(field, value);
        self.validation[pos] = validate_row(row);
        Ok(&self.validation[pos])
    }

    /// Replace the selection. Unknown indices are rejected.
    pub fn select(&mut self, rows: BTreeSet<usize>) -> Result<(), JobError> {
        self.ensure_editable()?;
        for &index in &rows {
            self.position(index)?;
        }
        self.selection = rows;
        Ok(())
    }

    /// Enrich the selected rows
    pub async fn enrich(
        &mut self,
        enricher: &dyn Enricher,
        throttle: Throttle,
    ) -> Result<&BTreeMap<usize, EnrichmentOutcome>, JobError> {
        self.ensure_editable()?;
        let outcomes = enrich_rows(&mut self.rows, &self.selection, enricher, throttle).await;
        for outcome in outcomes {
            self.enrichment.insert(outcome.row_index, outcome);
        }
        Ok(&self.enrichment)
    }

    /// Build the change-set for the selected rows.
    ///
    /// Selected rows that fail validation are reported, not planned. Records
    /// targeted by updates are fetched so updates carry only changed fields.
    pub async fn plan(&self, store: &dyn PlaceStore) -> Result<ChangeSet, JobError> {
        let mut errors = Vec::new();
        let mut rows = Vec::new();
        for &index in &self.selection {
            let pos = self.position(index)?;
            let result = &self.validation[pos];
            if result.is_valid() {
                rows.push(&self.rows[pos]);
            } else {
                errors.extend(validation_errors(result));
            }
        }

        let ids: BTreeSet<PlaceId> = rows
            .iter()
            .filter_map(|row| row_id(row).ok().flatten())
            .collect();
        let fetched = join_all(ids.iter().map(|id| store.get(id))).await;
        let mut originals = BTreeMap::new();
        for (id, result) in ids.into_iter().zip(fetched) {
            if let Some(record) = result? {
                originals.insert(id, record);
            }
        }

        let mut plan = build_import(&rows, &originals);
        errors.append(&mut plan.errors);
        errors.sort_by_key(|e| e.row);
        plan.errors = errors;
        Ok(plan)
    }

    /// Apply a plan. The ledger is persisted before the first store call.
    pub async fn commit<F>(
        &mut self,
        plan: &ChangeSet,
        ctx: &CommitContext<'_>,
        on_progress: F,
    ) -> Result<RunSummary, JobError>
    where
        F: FnMut(Progress),
    {
        advance(&mut self.phase, JobPhase::Committing)?;
        let ledger = RollbackLedger::new(self.id, JobKind::Import, self.source.clone());
        let (summary, counters) = commit_plan(ctx, ledger, plan, on_progress).await?;
        self.counters = counters;
        advance(&mut self.phase, finished_phase(summary.state))?;
        Ok(summary)
    }
}

fn finished_phase(state: RunState) -> JobPhase {
    if state == RunState::Cancelled {
        JobPhase::Cancelled
    } else {
        JobPhase::Committed
    }
}

// ============================================================================
// Bulk edit
// ============================================================================

/// Edits to a set of stored records, diffed against a snapshot taken at open.
///
/// Rows start numbered by their position in the snapshot, which is also
/// their line in the exported file. A row loaded from an edit file takes
/// that file's line, so every error of one plan uses the same numbering.
pub struct BulkEditJob {
    id: JobId,
    phase: JobPhase,
    originals: BTreeMap<PlaceId, Record>,
    rows: Vec<EditedRow>,
    validation: Vec<ValidationResult>,
    load_errors: Vec<RowError>,
    counters: Counters,
}

impl BulkEditJob {
    /// Snapshot `records` as the originals of this edit
    pub fn open(records: Vec<(PlaceId, Record)>) -> Result<Self, JobError> {
        let mut phase = JobPhase::Loaded;
        let rows: Vec<EditedRow> = records
            .iter()
            .enumerate()
            .map(|(i, (id, record))| EditedRow {
                id: *id,
                current: MappedRow::new(
                    i,
                    record.iter().map(|(f, v)| (*f, v.to_cell())).collect(),
                ),
                delete: false,
            })
            .collect();
        advance(&mut phase, JobPhase::Mapped)?;

        let validation = rows.iter().map(|r| validate_row(&r.current)).collect();
        advance(&mut phase, JobPhase::Validated)?;

        let id = JobId::new();
        info!(job = %id, records = rows.len(), "bulk edit opened");
        Ok(Self {
            id,
            phase,
            originals: records.into_iter().collect(),
            rows,
            validation,
            load_errors: Vec::new(),
            counters: Counters::default(),
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub fn rows(&self) -> &[EditedRow] {
        &self.rows
    }

    pub fn validation(&self) -> &[ValidationResult] {
        &self.validation
    }

    pub fn load_errors(&self) -> &[RowError] {
        &self.load_errors
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    fn position(&self, id: PlaceId) -> Result<usize, JobError> {
        self.rows
            .iter()
            .position(|r| r.id == id)
            .ok_or(JobError::UnknownRecord(id))
    }

    fn ensure_editable(&self) -> Result<(), JobError> {
        if self.phase != JobPhase::Validated {
            return Err(JobError::InvalidTransition {
                from: self.phase,
                to: JobPhase::Committing,
            });
        }
        Ok(())
    }

    pub fn set_value(
        &mut self,
        id: PlaceId,
        field: PlaceField,
        value: impl Into<String>,
    ) -> Result<&ValidationResult, JobError> {
        self.ensure_editable()?;
        let pos = self.position(id)?;
        self.rows[pos].current.set_override(field, value);
        self.validation[pos] = validate_row(&self.rows[pos].current);
        Ok(&self.validation[pos])
    }

    pub fn mark_deleted(&mut self, id: PlaceId, delete: bool) -> Result<(), JobError> {
        self.ensure_editable()?;
        let pos = self.position(id)?;
        self.rows[pos].delete = delete;
        Ok(())
    }

    /// Write the session as an editable CSV: `id`, every content field, `_delete`
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<(), JobError> {
        let mut out = csv::Writer::from_writer(writer);

        let mut header = vec![PlaceField::Id.as_str()];
        header.extend(PlaceField::content().iter().map(|f| f.as_str()));
        header.push(DELETE_COLUMN);
        out.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![row.id.to_string()];
            record.extend(
                PlaceField::content()
                    .iter()
                    .map(|&f| row.current.value(f).unwrap_or_default().to_string()),
            );
            record.push(if row.delete { "true" } else { "" }.to_string());
            out.write_record(&record)?;
        }
        out.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    /// Apply an edited table. Rows are matched by id; columns the file does
    /// not carry are left as they were. Row problems are collected in
    /// [`BulkEditJob::load_errors`].
    pub fn load_edits(&mut self, table: &SourceTable) -> Result<&[RowError], JobError> {
        self.ensure_editable()?;
        let mapping = auto_map(&table.headers, PlaceField::all());
        let id_header = mapping
            .source_for(PlaceField::Id)
            .ok_or(JobError::MissingIdColumn)?
            .to_string();
        let delete_header = table
            .headers
            .iter()
            .find(|h| normalize_key(h) == DELETE_COLUMN)
            .cloned();

        let mut seen = BTreeSet::new();
        for source in &table.rows {
            let line = source.index();
            let raw_id = source.get(&id_header).unwrap_or_default().trim();
            if raw_id.is_empty() {
                self.load_errors
                    .push(RowError::new(line, Some(PlaceField::Id), "id is required"));
                continue;
            }
            let id = match PlaceId::parse(raw_id) {
                Ok(id) => id,
                Err(e) => {
                    self.load_errors
                        .push(RowError::new(line, Some(PlaceField::Id), e.to_string()));
                    continue;
                }
            };
            let Ok(pos) = self.position(id) else {
                self.load_errors.push(RowError::new(
                    line,
                    Some(PlaceField::Id),
                    format!("record {} is not part of this edit", id),
                ));
                continue;
            };
            if !seen.insert(id) {
                self.load_errors.push(RowError::new(
                    line,
                    Some(PlaceField::Id),
                    format!("record {} appears more than once", id),
                ));
                continue;
            }

            let edited = mapping.apply(source, line);
            let row = &mut self.rows[pos];
            // From here on the row reports against the edit file's line
            row.current.row_index = line;
            for (&field, value) in edited.mapped() {
                if field != PlaceField::Id {
                    row.current.set_override(field, value.clone());
                }
            }
            row.delete = delete_header
                .as_deref()
                .and_then(|h| source.get(h))
                .is_some_and(is_truthy);
            self.validation[pos] = validate_row(&row.current);
        }

        Ok(&self.load_errors)
    }

    /// Build updates and deletes. Changed rows that fail validation are
    /// reported and left out.
    pub fn plan(&self) -> ChangeSet {
        let mut errors = self.load_errors.clone();
        let mut invalid = BTreeSet::new();

        for (row, result) in self.rows.iter().zip(&self.validation) {
            if row.delete || result.is_valid() {
                continue;
            }
            let Some(original) = self.originals.get(&row.id) else {
                continue;
            };
            let (changed, _) = diff_records(original, &merged_record(&row.current));
            if !changed.is_empty() {
                invalid.insert(row.id);
                errors.extend(validation_errors(result));
            }
        }

        let rows: Vec<&EditedRow> = self.rows.iter().collect();
        let mut plan = build_bulk_edit(&rows, &self.originals, &invalid);
        errors.append(&mut plan.errors);
        errors.sort_by_key(|e| e.row);
        plan.errors = errors;
        plan
    }

    pub async fn commit<F>(
        &mut self,
        plan: &ChangeSet,
        ctx: &CommitContext<'_>,
        on_progress: F,
    ) -> Result<RunSummary, JobError>
    where
        F: FnMut(Progress),
    {
        advance(&mut self.phase, JobPhase::Committing)?;
        let ledger = RollbackLedger::new(self.id, JobKind::Edit, "bulk edit");
        let (summary, counters) = commit_plan(ctx, ledger, plan, on_progress).await?;
        self.counters = counters;
        advance(&mut self.phase, finished_phase(summary.state))?;
        Ok(summary)
    }
}
