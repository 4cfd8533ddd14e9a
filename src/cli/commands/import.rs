//! `placeload import` command - Import places from CSV or spreadsheet files

use console::style;
use miette::{IntoDiagnostic, Result};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;

use crate::cli::helpers::{self, display_row};
use crate::cli::table;
use crate::cli::GlobalOpts;
use crate::core::Config;
use crate::pipeline::enrich::{GazetteerEnricher, Throttle};
use crate::core::MappedRow;
use crate::pipeline::parser::{self, SourceFormat, TextEncoding};
use crate::pipeline::{CommitContext, ImportJob, MappingOverride};

/// Planned entries shown before confirmation
const PREVIEW_ROWS: usize = 20;

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// CSV, TSV or spreadsheet file to import
    pub file: PathBuf,

    /// Force the source format instead of using the file extension
    #[arg(long, value_parser = parse_format)]
    pub source_format: Option<SourceFormat>,

    /// Text encoding of CSV sources (utf-8, windows-1251, iso-8859-1)
    #[arg(long, short = 'e', value_parser = helpers::parse_encoding)]
    pub encoding: Option<TextEncoding>,

    /// Map a field to a source column (field=Header); `field=` unmaps it
    #[arg(long = "map", short = 'm', value_name = "FIELD=HEADER")]
    pub mappings: Vec<MappingOverride>,

    /// Only import these rows (1-based, e.g. 1-10,14)
    #[arg(long)]
    pub rows: Option<RowRanges>,

    /// Fill empty fields from a reference file of known places
    #[arg(long, value_name = "FILE")]
    pub enrich: Option<PathBuf>,

    /// Show the plan without touching the store
    #[arg(long)]
    pub dry_run: bool,

    /// Apply without asking for confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Entries per batch (default from config)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Pause between batches in milliseconds (default from config)
    #[arg(long)]
    pub batch_delay_ms: Option<u64>,

    /// Show the full per-row error breakdown
    #[arg(long)]
    pub errors: bool,
}

fn parse_format(s: &str) -> Result<SourceFormat, String> {
    s.parse()
}

/// `--rows 1-3,7`: 0-based inclusive ranges, kept unexpanded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRanges(Vec<RangeInclusive<usize>>);

impl FromStr for RowRanges {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bound = |v: &str| -> Result<usize, String> {
            match v.trim().parse::<usize>() {
                Ok(n) if n >= 1 => Ok(n - 1),
                _ => Err(format!("invalid row number '{}'", v.trim())),
            }
        };
        let mut ranges = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let range = match part.split_once('-') {
                Some((start, end)) => bound(start)?..=bound(end)?,
                None => {
                    let row = bound(part)?;
                    row..=row
                }
            };
            if range.is_empty() {
                return Err(format!("invalid row range '{}'", part));
            }
            ranges.push(range);
        }
        Ok(Self(ranges))
    }
}

impl RowRanges {
    /// Row indices present in `rows` that some range covers. A range that
    /// covers no row at all is returned as the error.
    fn select(&self, rows: &[MappedRow]) -> Result<BTreeSet<usize>, RangeInclusive<usize>> {
        let mut selected = BTreeSet::new();
        for range in &self.0 {
            let covered: Vec<usize> = rows
                .iter()
                .map(|row| row.row_index)
                .filter(|index| range.contains(index))
                .collect();
            if covered.is_empty() {
                return Err(range.clone());
            }
            selected.extend(covered);
        }
        Ok(selected)
    }
}

pub fn run(args: ImportArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = helpers::open_workspace(global)?;
    let config = Config::load(Some(&workspace));
    let encoding = helpers::resolve_encoding(args.encoding, &config)?;

    if !args.file.exists() {
        return Err(miette::miette!("File not found: {}", args.file.display()));
    }

    let source_table = parser::parse_file(&args.file, args.source_format, encoding)
        .map_err(|e| miette::miette!("{}", e))?;
    if source_table.is_empty() {
        eprintln!(
            "{} {} has no rows; nothing to import",
            style("!").yellow(),
            style(args.file.display()).cyan()
        );
        return Ok(());
    }

    let source = args.file.display().to_string();
    let mut job = ImportJob::open(source_table, source.clone()).map_err(|e| miette::miette!("{}", e))?;
    if !args.mappings.is_empty() {
        job.remap(&args.mappings)
            .map_err(|e| miette::miette!("{}", e))?;
    }
    if let Some(ranges) = &args.rows {
        let rows = ranges.select(job.rows()).map_err(|bad| {
            miette::miette!(
                "Row {} is out of range ({} has {} rows)",
                display_row(*bad.start()),
                args.file.display(),
                job.rows().len()
            )
        })?;
        job.select(rows).map_err(|e| miette::miette!("{}", e))?;
    }

    let invalid = job.rows().len() - job.valid_rows().count();
    if !global.quiet && !global.format.is_json() {
        eprintln!(
            "{} Importing {} rows from {}{}",
            style("→").blue(),
            style(job.rows().len()).cyan(),
            style(&source).yellow(),
            if args.dry_run { style(" (dry run)").dim().to_string() } else { String::new() }
        );
        if global.verbose {
            eprintln!("{}", table::mapping(job.mapping()));
        }
        let ignored = job.mapping().ignored_headers(job.headers());
        if !ignored.is_empty() {
            eprintln!(
                "  {} ignored columns: {}",
                style("!").yellow(),
                ignored.join(", ")
            );
        }
        if invalid > 0 {
            eprintln!(
                "  {} {} row(s) failed validation",
                style("!").yellow(),
                style(invalid).red()
            );
            if args.errors {
                eprintln!("{}", table::validation(job.validation()));
            }
        }
    }

    let rt = helpers::runtime()?;
    rt.block_on(async {
        let store = helpers::open_store(&workspace)?;

        if let Some(path) = &args.enrich {
            let gazetteer = GazetteerEnricher::from_path(path, encoding)
                .map_err(|e| miette::miette!("{}", e))?;
            let throttle = Throttle {
                concurrency: config.enrich_concurrency(),
                delay: config.enrich_delay(),
            };
            let outcomes = job
                .enrich(&gazetteer, throttle)
                .await
                .map_err(|e| miette::miette!("{}", e))?;
            if !global.quiet && !global.format.is_json() {
                let filled: usize = outcomes.values().map(|o| o.filled.len()).sum();
                let failed = outcomes.values().filter(|o| !o.success).count();
                eprintln!(
                    "  {} enriched {} row(s), {} field(s) filled, {} without a match",
                    style("✓").green(),
                    outcomes.len() - failed,
                    filled,
                    failed
                );
            }
        }

        let plan = job.plan(&store).await.map_err(|e| miette::miette!("{}", e))?;

        if !global.quiet && !global.format.is_json() {
            eprintln!(
                "  Plan: {} to create, {} to update, {} unchanged, {} error(s)",
                style(plan.creates()).green(),
                style(plan.updates()).yellow(),
                style(plan.unchanged).dim(),
                style(plan.errors.len()).red()
            );
            if !plan.is_empty() && (args.dry_run || !args.yes) {
                eprintln!("{}", table::plan(&plan, PREVIEW_ROWS));
                if plan.entries.len() > PREVIEW_ROWS {
                    eprintln!("  ... and {} more", plan.entries.len() - PREVIEW_ROWS);
                }
            }
        }

        if args.dry_run {
            if global.format.is_json() {
                let errors: Vec<_> = plan.errors.iter().collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "create": plan.creates(),
                        "update": plan.updates(),
                        "unchanged": plan.unchanged,
                        "errors": errors,
                    }))
                    .into_diagnostic()?
                );
            } else {
                if args.errors && !plan.errors.is_empty() {
                    println!("{}", table::errors(&plan.errors));
                }
                println!("{}", style("Dry run complete. No changes were made.").yellow());
            }
            return Ok(());
        }

        if plan.is_empty() {
            if !global.format.is_json() {
                println!("{}", style("Nothing to apply.").yellow());
                for e in &plan.errors {
                    println!("  row {}: {}", display_row(e.row), e.message);
                }
            }
            return if !plan.errors.is_empty() {
                Err(miette::miette!("Import finished with {} error(s)", plan.errors.len()))
            } else if job.selection().is_empty() && invalid > 0 {
                Err(miette::miette!(
                    "No valid rows to import: {} row(s) failed validation (see --errors)",
                    invalid
                ))
            } else {
                Ok(())
            };
        }

        if !helpers::confirm(
            &format!("Apply {} change(s) to the store?", plan.entries.len()),
            args.yes,
        )? {
            println!("Aborted.");
            return Ok(());
        }

        let ledgers = workspace.ledgers();
        let ctx = CommitContext {
            store: &store,
            ledgers: &ledgers,
            options: helpers::batch_options(&config, args.batch_size, args.batch_delay_ms),
            cancel: helpers::cancel_on_ctrl_c(),
        };
        let summary = job
            .commit(&plan, &ctx, helpers::progress_printer(global.quiet || global.format.is_json()))
            .await
            .map_err(|e| miette::miette!("{}", e))?;

        helpers::report_summary(&summary, global, args.errors)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    fn rows(indices: &[usize]) -> Vec<MappedRow> {
        indices.iter().map(|&i| MappedRow::new(i, BTreeMap::new())).collect()
    }

    fn ranges(s: &str) -> RowRanges {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_rows() {
        assert_eq!(ranges("1-3,7"), RowRanges(vec![0..=2, 6..=6]));
        assert_eq!(ranges(" 2 "), RowRanges(vec![1..=1]));
        assert!("0".parse::<RowRanges>().is_err());
        assert!("5-2".parse::<RowRanges>().is_err());
        assert!("a".parse::<RowRanges>().is_err());
    }

    #[test]
    fn test_select_rows() {
        let all = rows(&[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(ranges("1-3,7").select(&all).unwrap(), BTreeSet::from([0, 1, 2, 6]));
        assert_eq!(ranges("9").select(&all).unwrap_err(), 8..=8);
    }

    #[test]
    fn test_huge_range_is_clamped_to_rows() {
        let all = rows(&[0, 1, 2]);
        let wide = ranges("1-99999999999");
        assert_eq!(wide.select(&all).unwrap(), BTreeSet::from([0, 1, 2]));
        assert!(ranges("50-99999999999").select(&all).is_err());
    }

    #[test]
    fn test_select_rows_skips_blank_lines() {
        // Source rows 2 and 3 were blank lines
        let sparse = rows(&[0, 3]);
        assert_eq!(ranges("1-4").select(&sparse).unwrap(), BTreeSet::from([0, 3]));
        assert_eq!(ranges("2").select(&sparse).unwrap_err(), 1..=1);
    }
}
