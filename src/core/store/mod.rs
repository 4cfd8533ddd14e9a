//! Place store: the per-record backend the pipeline reconciles against
//!
//! The store deliberately offers only single-record operations. There is no
//! multi-record transaction, so every batch the reconciler issues may land
//! partially.

mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::field::Record;
use crate::core::identity::PlaceId;

pub use sqlite::SqliteStore;

/// Errors reported by a place store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(PlaceId),

    #[error("store rejected the request: {0}")]
    Rejected(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("stored record is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Per-record operations against a place backend
#[async_trait]
pub trait PlaceStore: Send + Sync {
    /// Fetch one record
    async fn get(&self, id: &PlaceId) -> Result<Option<Record>, StoreError>;

    /// Fetch every record, ordered by id
    async fn list(&self) -> Result<Vec<(PlaceId, Record)>, StoreError>;

    /// Create a record and return its new id
    async fn create(&self, record: &Record) -> Result<PlaceId, StoreError>;

    /// Apply a partial record; `Null` clears a field. Returns the stored result.
    async fn update(&self, id: &PlaceId, patch: &Record) -> Result<Record, StoreError>;

    /// Delete a record
    async fn delete(&self, id: &PlaceId) -> Result<(), StoreError>;
}
