//! placeload: bulk import and bulk edit of place records
//!
//! Tabular sources are parsed, mapped onto a fixed place schema, validated,
//! optionally enriched, and reconciled against a per-record store in
//! throttled batches. Every committed run leaves a rollback ledger that can
//! undo it once.

pub mod cli;
pub mod core;
pub mod pipeline;
