//! Single-shot undo of a committed run
//!
//! Created records are deleted and updated records get their pre-update
//! values back. Undo goes through the same batching as the forward run and
//! tolerates partial failure.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::field::Record;
use crate::core::identity::PlaceId;
use crate::core::ledger::RollbackLedger;
use crate::core::store::PlaceStore;
use crate::pipeline::changeset::{ChangeSetEntry, PlannedEntry};
use crate::pipeline::reconcile::{BatchOptions, Progress, Reconciler, RunState};

/// One entry undo could not reverse
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndoFailure {
    pub id: PlaceId,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UndoReport {
    pub deleted: usize,
    pub restored: usize,
    pub failures: Vec<UndoFailure>,
    pub state: RunState,
}

impl UndoReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.state == RunState::Completed
    }
}

/// The entries that reverse a ledger: deletes first, then restores
fn reversal(ledger: &RollbackLedger) -> Vec<PlannedEntry> {
    let deletes = ledger
        .created_ids()
        .iter()
        .map(|id| ChangeSetEntry::Delete { id: *id });
    let restores = ledger
        .updated_snapshots()
        .iter()
        .map(|snap| ChangeSetEntry::Update {
            id: snap.id,
            changed: snap.fields_before_change.clone(),
            original: Record::new(),
        });

    deletes
        .chain(restores)
        .enumerate()
        .map(|(row_index, entry)| PlannedEntry { row_index, entry })
        .collect()
}

/// Reverse everything `ledger` recorded. The ledger is consumed.
pub async fn undo<F>(
    ledger: RollbackLedger,
    store: &dyn PlaceStore,
    options: BatchOptions,
    cancel: CancellationToken,
    mut on_progress: F,
) -> UndoReport
where
    F: FnMut(Progress),
{
    let entries = reversal(&ledger);
    info!(job = %ledger.job_id(), entries = entries.len(), "undo started");

    // Undo itself is not undoable; its successes go to a scratch ledger
    let mut scratch = RollbackLedger::new(ledger.job_id(), ledger.kind(), ledger.source());
    let run = Reconciler::new(store, options)
        .with_cancellation(cancel)
        .run(&entries, &mut scratch, |progress, _| on_progress(progress))
        .await;

    let failures = run
        .outcomes
        .iter()
        .filter_map(|o| {
            Some(UndoFailure {
                id: o.target?,
                message: o.error.clone()?,
            })
        })
        .collect();

    UndoReport {
        deleted: run.counters.deleted,
        restored: run.counters.updated,
        failures,
        state: run.state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::field::{FieldValue, PlaceField};
    use crate::core::identity::JobId;
    use crate::core::ledger::JobKind;
    use crate::core::store::SqliteStore;
    use std::time::Duration;

    fn fast() -> BatchOptions {
        BatchOptions {
            batch_size: 2,
            batch_delay: Duration::ZERO,
        }
    }

    fn name(s: &str) -> Record {
        Record::from([(PlaceField::Name, FieldValue::Text(s.to_string()))])
    }

    #[tokio::test]
    async fn test_undo_deletes_created_and_restores_updated() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.create(&name("a")).await.unwrap();
        let b = store.create(&name("b")).await.unwrap();
        let c = store
            .create(&Record::from([
                (PlaceField::Name, FieldValue::Text("c".into())),
                (PlaceField::Latitude, FieldValue::Number(1.0)),
            ]))
            .await
            .unwrap();
        store
            .update(&c, &Record::from([(PlaceField::Latitude, FieldValue::Number(2.0))]))
            .await
            .unwrap();

        let mut ledger = RollbackLedger::new(JobId::new(), JobKind::Import, "t.csv");
        ledger.record_created(a);
        ledger.record_created(b);
        ledger.record_updated(c, Record::from([(PlaceField::Latitude, FieldValue::Number(1.0))]));

        let report = undo(ledger, &store, fast(), CancellationToken::new(), |_| {}).await;

        assert!(report.is_complete(), "{:?}", report.failures);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.restored, 1);
        assert!(store.get(&a).await.unwrap().is_none());
        assert!(store.get(&b).await.unwrap().is_none());
        let restored = store.get(&c).await.unwrap().unwrap();
        assert_eq!(restored.get(&PlaceField::Latitude), Some(&FieldValue::Number(1.0)));
        assert_eq!(restored.get(&PlaceField::Name), Some(&FieldValue::Text("c".into())));
    }

    #[tokio::test]
    async fn test_undo_restores_cleared_fields_and_clears_added_ones() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.create(&name("x")).await.unwrap();
        store
            .update(
                &id,
                &Record::from([
                    (PlaceField::Name, FieldValue::Null),
                    (PlaceField::City, FieldValue::Text("Krakow".into())),
                ]),
            )
            .await
            .unwrap();

        let mut ledger = RollbackLedger::new(JobId::new(), JobKind::Edit, "edit");
        ledger.record_updated(
            id,
            Record::from([
                (PlaceField::Name, FieldValue::Text("x".into())),
                (PlaceField::City, FieldValue::Null),
            ]),
        );
        let report = undo(ledger, &store, fast(), CancellationToken::new(), |_| {}).await;

        assert_eq!(report.restored, 1);
        assert_eq!(store.get(&id).await.unwrap().unwrap(), name("x"));
    }

    #[tokio::test]
    async fn test_missing_records_are_failures_not_successes() {
        let store = SqliteStore::open_in_memory().unwrap();
        let kept = store.create(&name("kept")).await.unwrap();
        let gone = PlaceId::new();

        let mut ledger = RollbackLedger::new(JobId::new(), JobKind::Import, "t.csv");
        ledger.record_created(kept);
        ledger.record_created(gone);
        ledger.record_updated(PlaceId::new(), name("old"));

        let mut calls = 0;
        let report = undo(ledger, &store, fast(), CancellationToken::new(), |_| calls += 1).await;

        assert_eq!(report.deleted, 1);
        assert_eq!(report.restored, 0);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().any(|f| f.id == gone));
        assert_eq!(report.state, RunState::PartiallyFailed);
        assert_eq!(calls, 2);
    }
}
