//! Run summary handed back to the operator (and to undo)

use serde::Serialize;

use crate::core::identity::{JobId, PlaceId};
use crate::core::ledger::{JobKind, RollbackLedger, UpdateSnapshot};
use crate::pipeline::changeset::{ChangeSet, RowError};
use crate::pipeline::reconcile::{RunReport, RunState};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub job_id: JobId,
    pub kind: JobKind,
    pub state: RunState,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: usize,
    pub skipped: usize,
    pub unchanged: usize,
    pub error_details: Vec<RowError>,
    pub created_ids: Vec<PlaceId>,
    pub updated_snapshots: Vec<UpdateSnapshot>,
}

impl RunSummary {
    /// Combine planning errors, the run report and the ledger
    pub fn new(plan: &ChangeSet, report: &RunReport, ledger: &RollbackLedger) -> Self {
        let mut error_details: Vec<RowError> = plan
            .errors
            .iter()
            .chain(report.errors.iter())
            .cloned()
            .collect();
        error_details.sort_by_key(|e| e.row);

        Self {
            job_id: ledger.job_id(),
            kind: ledger.kind(),
            state: report.state,
            created: report.counters.created,
            updated: report.counters.updated,
            deleted: report.counters.deleted,
            errors: error_details.len(),
            skipped: report.counters.skipped,
            unchanged: plan.unchanged,
            error_details,
            created_ids: ledger.created_ids().iter().copied().collect(),
            updated_snapshots: ledger.updated_snapshots().to_vec(),
        }
    }

    /// True when the run left something to undo
    pub fn is_undoable(&self) -> bool {
        !self.created_ids.is_empty() || !self.updated_snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::reconcile::Counters;

    #[test]
    fn test_errors_merge_in_row_order() {
        let plan = ChangeSet {
            entries: Vec::new(),
            unchanged: 3,
            errors: vec![RowError::new(4, None, "late")],
        };
        let report = RunReport {
            state: RunState::PartiallyFailed,
            counters: Counters {
                processed: 2,
                created: 1,
                errored: 1,
                ..Default::default()
            },
            errors: vec![RowError::new(1, None, "early")],
            outcomes: Vec::new(),
        };
        let mut ledger = RollbackLedger::new(JobId::new(), JobKind::Import, "x.csv");
        ledger.record_created(PlaceId::new());

        let summary = RunSummary::new(&plan, &report, &ledger);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.error_details[0].message, "early");
        assert_eq!(summary.unchanged, 3);
        assert_eq!(summary.created_ids.len(), 1);
        assert!(summary.is_undoable());

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["state"], "partially_failed");
        assert_eq!(json["kind"], "import");
        assert!(json["error_details"][0].get("field").is_none());
    }
}
