//! Core module - domain types, configuration and storage

pub mod config;
pub mod field;
pub mod identity;
pub mod ledger;
pub mod record;
pub mod store;
pub mod workspace;

pub use config::Config;
pub use field::{FieldKind, FieldValue, PlaceField, Record};
pub use identity::{IdParseError, JobId, PlaceId};
pub use ledger::{JobKind, LedgerError, LedgerInfo, LedgerStore, RollbackLedger, UpdateSnapshot};
pub use record::{Cell, MappedRow, SourceRow, SourceTable};
pub use store::{PlaceStore, SqliteStore, StoreError};
pub use workspace::{Workspace, WorkspaceError};
