//! Pipeline module - parse, map, validate, enrich, plan, reconcile, undo

pub mod changeset;
pub mod enrich;
pub mod job;
pub mod mapper;
pub mod parser;
pub mod reconcile;
pub mod summary;
pub mod undo;
pub mod validator;

pub use changeset::{ChangeSet, ChangeSetEntry, EditedRow, PlannedEntry, RowError};
pub use enrich::{EnrichError, Enricher, EnrichmentOutcome, GazetteerEnricher, Throttle};
pub use job::{BulkEditJob, CommitContext, ImportJob, JobError, JobPhase};
pub use mapper::{FieldMapping, MappingError, MappingOverride};
pub use parser::{ParseError, SourceFormat, TextEncoding};
pub use reconcile::{BatchOptions, Counters, Progress, Reconciler, RunReport, RunState};
pub use summary::RunSummary;
pub use undo::{UndoFailure, UndoReport};
pub use validator::ValidationResult;
