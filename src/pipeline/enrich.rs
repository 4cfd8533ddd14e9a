//! Enrichment: best-effort filling of missing fields from an external lookup
//!
//! The lookup itself is a collaborator behind [`Enricher`]. This module owns
//! the rules around it: only selected rows are looked up, calls are throttled
//! in waves, and results only ever land in fields the row has left empty.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::field::PlaceField;
use crate::core::record::MappedRow;
use crate::pipeline::mapper::auto_map;
use crate::pipeline::parser::{self, ParseError, TextEncoding};

/// Known fields of a row, sent to the lookup
pub type Candidate = BTreeMap<PlaceField, String>;

/// Per-row lookup failure. The row proceeds without the missing fields.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("no match for '{0}'")]
    NotFound(String),

    #[error("row has no name to look up")]
    NoName,

    #[error("lookup failed: {0}")]
    Lookup(String),
}

/// External lookup that proposes values for canonical fields
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, candidate: &Candidate) -> Result<BTreeMap<PlaceField, String>, EnrichError>;
}

/// Result of enriching one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichmentOutcome {
    pub row_index: usize,
    pub success: bool,
    pub filled: BTreeSet<PlaceField>,
    pub message: Option<String>,
}

/// Bounded concurrency plus a pause between waves of lookups
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    pub concurrency: usize,
    pub delay: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            concurrency: crate::core::config::DEFAULT_ENRICH_CONCURRENCY,
            delay: Duration::from_millis(crate::core::config::DEFAULT_ENRICH_DELAY_MS),
        }
    }
}

/// Enrich the selected rows in place.
///
/// Rows are looked up in waves of `throttle.concurrency`; each lookup is
/// awaited independently so one failure never drops a sibling's result.
pub async fn enrich_rows(
    rows: &mut [MappedRow],
    selection: &BTreeSet<usize>,
    enricher: &dyn Enricher,
    throttle: Throttle,
) -> Vec<EnrichmentOutcome> {
    let candidates: Vec<(usize, Candidate)> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| selection.contains(&row.row_index))
        .map(|(pos, row)| (pos, row.filled_values()))
        .collect();

    let mut outcomes = Vec::with_capacity(candidates.len());
    let wave_size = throttle.concurrency.max(1);
    let waves = candidates.chunks(wave_size).count();

    for (wave_no, wave) in candidates.chunks(wave_size).enumerate() {
        let results = join_all(wave.iter().map(|(_, c)| enricher.enrich(c))).await;

        for ((pos, _), result) in wave.iter().zip(results) {
            let row = &mut rows[*pos];
            let outcome = match result {
                Ok(values) => {
                    let filled = row.apply_enrichment(values);
                    debug!(row = row.row_index, filled = filled.len(), "enriched row");
                    EnrichmentOutcome {
                        row_index: row.row_index,
                        success: true,
                        filled,
                        message: None,
                    }
                }
                Err(e) => {
                    warn!(row = row.row_index, error = %e, "enrichment failed");
                    EnrichmentOutcome {
                        row_index: row.row_index,
                        success: false,
                        filled: BTreeSet::new(),
                        message: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        if wave_no + 1 < waves && !throttle.delay.is_zero() {
            tokio::time::sleep(throttle.delay).await;
        }
    }

    info!(
        rows = outcomes.len(),
        failed = outcomes.iter().filter(|o| !o.success).count(),
        "enrichment finished"
    );
    outcomes
}

/// Local lookup against a reference table of known places.
///
/// Entries match on case-insensitive name, narrowed by city when the
/// candidate has one.
#[derive(Debug, Clone, Default)]
pub struct GazetteerEnricher {
    entries: Vec<BTreeMap<PlaceField, String>>,
}

impl GazetteerEnricher {
    pub fn new(entries: Vec<BTreeMap<PlaceField, String>>) -> Self {
        Self { entries }
    }

    /// Load a reference table (CSV or spreadsheet) whose headers use
    /// canonical field names
    pub fn from_path(path: &Path, encoding: TextEncoding) -> Result<Self, ParseError> {
        let table = parser::parse_file(path, None, encoding)?;
        let mapping = auto_map(&table.headers, PlaceField::all());
        let entries = table
            .rows
            .iter()
            .map(|row| mapping.apply(row, row.index()).filled_values())
            .filter(|values| values.contains_key(&PlaceField::Name))
            .collect();
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn same_text(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

#[async_trait]
impl Enricher for GazetteerEnricher {
    async fn enrich(&self, candidate: &Candidate) -> Result<BTreeMap<PlaceField, String>, EnrichError> {
        let name = candidate.get(&PlaceField::Name).ok_or(EnrichError::NoName)?;
        let city = candidate.get(&PlaceField::City);

        let hit = self.entries.iter().find(|entry| {
            entry
                .get(&PlaceField::Name)
                .is_some_and(|n| same_text(n, name))
                && match (city, entry.get(&PlaceField::City)) {
                    (Some(wanted), Some(have)) => same_text(wanted, have),
                    _ => true,
                }
        });

        hit.map(|entry| {
            entry
                .iter()
                .filter(|(field, _)| !matches!(field, PlaceField::Id | PlaceField::Name))
                .map(|(f, v)| (*f, v.clone()))
                .collect()
        })
        .ok_or_else(|| EnrichError::NotFound(name.clone()))
    }
}
