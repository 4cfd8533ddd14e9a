//! Batch reconciler: applies a change-set against a non-transactional store
//!
//! Batches run strictly in order. Entries inside a batch run concurrently and
//! are awaited independently, so one failing entry never blocks or cancels a
//! sibling. Every success is appended to the rollback ledger before the next
//! batch starts.

use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::config::{Config, DEFAULT_BATCH_DELAY_MS, DEFAULT_BATCH_SIZE};
use crate::core::identity::PlaceId;
use crate::core::ledger::RollbackLedger;
use crate::core::store::{PlaceStore, StoreError};
use crate::pipeline::changeset::{ChangeSetEntry, PlannedEntry, RowError};

/// Batch size and inter-batch delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
        }
    }
}

impl BatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size(),
            batch_delay: config.batch_delay(),
        }
    }
}

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    PartiallyFailed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::PartiallyFailed | RunState::Cancelled
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::PartiallyFailed => "partially failed",
            RunState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Reported to the progress callback after every batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

/// Running counters for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errored: usize,
    pub skipped: usize,
}

/// What happened to one entry
#[derive(Debug, Clone, PartialEq)]
pub struct EntryOutcome {
    pub row_index: usize,
    /// Affected record; for creates, the new id on success
    pub target: Option<PlaceId>,
    pub error: Option<String>,
}

impl EntryOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Final report of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub state: RunState,
    pub counters: Counters,
    pub errors: Vec<RowError>,
    pub outcomes: Vec<EntryOutcome>,
}

/// Executes planned entries in batches against a store
pub struct Reconciler<'a> {
    store: &'a dyn PlaceStore,
    options: BatchOptions,
    cancel: CancellationToken,
    state: RunState,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn PlaceStore, options: BatchOptions) -> Self {
        Self {
            store,
            options,
            cancel: CancellationToken::new(),
            state: RunState::Idle,
        }
    }

    /// Stop starting new batches once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    async fn apply(&self, entry: &ChangeSetEntry) -> Result<PlaceId, StoreError> {
        match entry {
            ChangeSetEntry::Create { fields } => self.store.create(fields).await,
            ChangeSetEntry::Update { id, changed, .. } => {
                self.store.update(id, changed).await.map(|_| *id)
            }
            ChangeSetEntry::Delete { id } => self.store.delete(id).await.map(|_| *id),
        }
    }

    /// Run every entry, appending successes to `ledger`.
    ///
    /// `on_batch` is called after each batch with the progress so far and the
    /// ledger as it stands; it is the hook used to checkpoint the ledger.
    pub async fn run<F>(
        &mut self,
        entries: &[PlannedEntry],
        ledger: &mut RollbackLedger,
        mut on_batch: F,
    ) -> RunReport
    where
        F: FnMut(Progress, &RollbackLedger),
    {
        let mut report = RunReport::default();
        let total = entries.len();
        let batch_size = self.options.batch_size.max(1);
        let batches: Vec<&[PlannedEntry]> = entries.chunks(batch_size).collect();

        self.state = RunState::Running;
        info!(entries = total, batches = batches.len(), "reconciliation started");

        let mut cancelled = false;
        for (batch_no, batch) in batches.iter().enumerate() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let results = join_all(batch.iter().map(|p| self.apply(&p.entry))).await;

            for (planned, result) in batch.iter().zip(results) {
                let outcome = self.record(planned, result, ledger, &mut report);
                report.outcomes.push(outcome);
            }
            report.counters.processed += batch.len();

            info!(
                batch = batch_no + 1,
                processed = report.counters.processed,
                total,
                errored = report.counters.errored,
                "batch finished"
            );
            on_batch(
                Progress {
                    processed: report.counters.processed,
                    total,
                },
                ledger,
            );

            if batch_no + 1 < batches.len() && !self.options.batch_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.options.batch_delay) => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
        }

        report.counters.skipped = total - report.counters.processed;
        self.state = if cancelled {
            RunState::Cancelled
        } else if report.counters.errored > 0 {
            RunState::PartiallyFailed
        } else {
            RunState::Completed
        };
        report.state = self.state;

        info!(
            state = %report.state,
            created = report.counters.created,
            updated = report.counters.updated,
            deleted = report.counters.deleted,
            errored = report.counters.errored,
            skipped = report.counters.skipped,
            "reconciliation finished"
        );
        report
    }

    fn record(
        &self,
        planned: &PlannedEntry,
        result: Result<PlaceId, StoreError>,
        ledger: &mut RollbackLedger,
        report: &mut RunReport,
    ) -> EntryOutcome {
        let row_index = planned.row_index;
        match result {
            Ok(id) => {
                debug!(row = row_index, id = %id, op = planned.entry.verb(), "entry applied");
                match &planned.entry {
                    ChangeSetEntry::Create { .. } => {
                        ledger.record_created(id);
                        report.counters.created += 1;
                    }
                    ChangeSetEntry::Update { original, .. } => {
                        ledger.record_updated(id, original.clone());
                        report.counters.updated += 1;
                    }
                    ChangeSetEntry::Delete { .. } => report.counters.deleted += 1,
                }
                EntryOutcome {
                    row_index,
                    target: Some(id),
                    error: None,
                }
            }
            Err(e) => {
                warn!(row = row_index, op = planned.entry.verb(), error = %e, "entry failed");
                report.counters.errored += 1;
                report
                    .errors
                    .push(RowError::new(row_index, None, e.to_string()));
                EntryOutcome {
                    row_index,
                    target: planned.entry.target(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
