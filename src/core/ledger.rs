//! Rollback ledger: what a run changed, enough to reverse it once
//!
//! Ledgers are persisted under `.placeload/ledgers/<job-id>.json` before the
//! first store call and rewritten after every batch, so an interrupted run
//! can still be undone from a later process.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::field::Record;
use crate::core::identity::{JobId, PlaceId};

/// Which kind of run produced a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Import,
    Edit,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Import => write!(f, "import"),
            JobKind::Edit => write!(f, "edit"),
        }
    }
}

/// Field values of one record as they were before an update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSnapshot {
    pub id: PlaceId,
    pub fields_before_change: Record,
}

/// Append-only record of the changes a run committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackLedger {
    job_id: JobId,
    kind: JobKind,
    source: String,
    created_at: DateTime<Utc>,
    created_ids: BTreeSet<PlaceId>,
    updated_snapshots: Vec<UpdateSnapshot>,
}

impl RollbackLedger {
    pub fn new(job_id: JobId, kind: JobKind, source: impl Into<String>) -> Self {
        Self {
            job_id,
            kind,
            source: source.into(),
            created_at: Utc::now(),
            created_ids: BTreeSet::new(),
            updated_snapshots: Vec::new(),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_ids(&self) -> &BTreeSet<PlaceId> {
        &self.created_ids
    }

    pub fn updated_snapshots(&self) -> &[UpdateSnapshot] {
        &self.updated_snapshots
    }

    /// Record a successfully created id
    pub fn record_created(&mut self, id: PlaceId) {
        self.created_ids.insert(id);
    }

    /// Record the pre-update values of a successfully updated record
    pub fn record_updated(&mut self, id: PlaceId, fields_before_change: Record) {
        self.updated_snapshots.push(UpdateSnapshot {
            id,
            fields_before_change,
        });
    }

    /// Number of reversible changes
    pub fn len(&self) -> usize {
        self.created_ids.len() + self.updated_snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Errors from ledger persistence
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no pending ledger for {0}")]
    NotFound(JobId),

    #[error("no pending ledgers")]
    NonePending,

    #[error("failed to access ledger file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger file {path} is unreadable: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Summary line for a pending ledger
#[derive(Debug, Clone, Serialize)]
pub struct LedgerInfo {
    pub job_id: JobId,
    pub kind: JobKind,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub created: usize,
    pub updated: usize,
}

impl From<&RollbackLedger> for LedgerInfo {
    fn from(ledger: &RollbackLedger) -> Self {
        Self {
            job_id: ledger.job_id,
            kind: ledger.kind,
            source: ledger.source.clone(),
            created_at: ledger.created_at,
            created: ledger.created_ids.len(),
            updated: ledger.updated_snapshots.len(),
        }
    }
}

/// Directory of persisted ledgers, one JSON file per job
#[derive(Debug, Clone)]
pub struct LedgerStore {
    dir: PathBuf,
}

impl LedgerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, job_id: JobId) -> PathBuf {
        self.dir.join(format!("{}.json", job_id))
    }

    fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> LedgerError + '_ {
        move |source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Write a ledger, replacing any earlier checkpoint of the same job
    pub fn save(&self, ledger: &RollbackLedger) -> Result<(), LedgerError> {
        fs::create_dir_all(&self.dir).map_err(Self::io_err(&self.dir))?;

        let path = self.path_for(ledger.job_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(ledger).map_err(|source| LedgerError::Format {
            path: path.clone(),
            source,
        })?;
        fs::write(&tmp, json).map_err(Self::io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(Self::io_err(&path))?;
        Ok(())
    }

    pub fn load(&self, job_id: JobId) -> Result<RollbackLedger, LedgerError> {
        let path = self.path_for(job_id);
        if !path.exists() {
            return Err(LedgerError::NotFound(job_id));
        }
        let contents = fs::read_to_string(&path).map_err(Self::io_err(&path))?;
        serde_json::from_str(&contents).map_err(|source| LedgerError::Format { path, source })
    }

    /// Pending job ids, oldest first
    pub fn pending(&self) -> Result<Vec<JobId>, LedgerError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(Self::io_err(&self.dir))? {
            let entry = entry.map_err(Self::io_err(&self.dir))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Ok(id) = JobId::parse(stem) {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn list(&self) -> Result<Vec<LedgerInfo>, LedgerError> {
        self.pending()?
            .into_iter()
            .map(|id| self.load(id).map(|l| LedgerInfo::from(&l)))
            .collect()
    }

    pub fn latest(&self) -> Result<JobId, LedgerError> {
        self.pending()?.pop().ok_or(LedgerError::NonePending)
    }

    /// Load a ledger and remove it from disk. A ledger can be taken once.
    pub fn take(&self, job_id: JobId) -> Result<RollbackLedger, LedgerError> {
        let ledger = self.load(job_id)?;
        self.discard(job_id)?;
        Ok(ledger)
    }

    pub fn discard(&self, job_id: JobId) -> Result<(), LedgerError> {
        let path = self.path_for(job_id);
        if !path.exists() {
            return Err(LedgerError::NotFound(job_id));
        }
        fs::remove_file(&path).map_err(Self::io_err(&path))
    }
}
