//! `placeload edit` command - Bulk edit stored places through a CSV file

use console::style;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::cli::helpers;
use crate::cli::table;
use crate::cli::GlobalOpts;
use crate::core::{Config, PlaceField, PlaceId, PlaceStore};
use crate::pipeline::parser::{self, TextEncoding};
use crate::pipeline::{BulkEditJob, CommitContext};

#[derive(clap::Args, Debug)]
pub struct EditArgs {
    /// Write every stored place to an editable CSV file and stop
    #[arg(long, value_name = "FILE", conflicts_with = "from")]
    pub export: Option<PathBuf>,

    /// Apply an edited CSV file (id column required; _delete marks removal)
    #[arg(long, value_name = "FILE")]
    pub from: Option<PathBuf>,

    /// Text encoding of the --from file (default from config, else utf-8)
    #[arg(long, short = 'e', value_parser = helpers::parse_encoding, requires = "from")]
    pub encoding: Option<TextEncoding>,

    /// Set one field directly: ID:field=value (repeatable)
    #[arg(long = "set", value_name = "ID:FIELD=VALUE", conflicts_with = "export")]
    pub sets: Vec<FieldEdit>,

    /// Delete a place (repeatable)
    #[arg(long = "delete", value_name = "ID", conflicts_with = "export")]
    pub deletes: Vec<PlaceId>,

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

/// `ID:field=value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEdit {
    pub id: PlaceId,
    pub field: PlaceField,
    pub value: String,
}

impl FromStr for FieldEdit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid edit '{}': expected ID:field=value", s);
        let (id, rest) = s.split_once(':').ok_or_else(invalid)?;
        let (field, value) = rest.split_once('=').ok_or_else(invalid)?;
        Ok(Self {
            id: id.parse::<PlaceId>().map_err(|e| e.to_string())?,
            field: field.parse()?,
            value: value.to_string(),
        })
    }
}

pub fn run(args: EditArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = helpers::open_workspace(global)?;
    let config = Config::load(Some(&workspace));

    let rt = helpers::runtime()?;
    rt.block_on(async {
        let store = helpers::open_store(&workspace)?;
        let records = store.list().await.map_err(|e| miette::miette!("{}", e))?;
        let mut job = BulkEditJob::open(records).map_err(|e| miette::miette!("{}", e))?;

        if let Some(path) = &args.export {
            let file = File::create(path).into_diagnostic()?;
            job.export_csv(file).map_err(|e| miette::miette!("{}", e))?;
            println!(
                "{} Exported {} place(s) to {}",
                style("✓").green(),
                style(job.rows().len()).cyan(),
                style(path.display()).cyan()
            );
            println!(
                "Edit it, then apply with {}",
                style(format!("placeload edit --from {}", path.display())).yellow()
            );
            return Ok(());
        }

        // Keeps the temp file alive until the edits are loaded
        let mut scratch = None;
        let edits_file = match &args.from {
            Some(path) => Some((path.clone(), helpers::resolve_encoding(args.encoding, &config)?)),
            None if args.sets.is_empty() && args.deletes.is_empty() => {
                // The scratch copy is written by export_csv, always utf-8
                let file = edit_in_editor(&job, &config)?;
                let path = file.path().to_path_buf();
                scratch = Some(file);
                Some((path, TextEncoding::Utf8))
            }
            None => None,
        };

        if let Some((path, encoding)) = &edits_file {
            load_edits(&mut job, path, *encoding)?;
        }
        drop(scratch);

        for edit in &args.sets {
            job.set_value(edit.id, edit.field, edit.value.clone())
                .map_err(|e| miette::miette!("{}", e))?;
        }
        for id in &args.deletes {
            job.mark_deleted(*id, true)
                .map_err(|e| miette::miette!("{}", e))?;
        }

        let plan = job.plan();
        if !global.quiet && !global.format.is_json() {
            eprintln!(
                "  Plan: {} to update, {} to delete, {} unchanged, {} error(s)",
                style(plan.updates()).yellow(),
                style(plan.deletes()).red(),
                style(plan.unchanged).dim(),
                style(plan.errors.len()).red()
            );
            if !plan.is_empty() {
                eprintln!("{}", table::plan(&plan, usize::MAX));
            }
            if args.errors && !plan.errors.is_empty() {
                eprintln!("{}", table::errors(&plan.errors));
            }
        }

        if args.dry_run {
            println!("{}", style("Dry run complete. No changes were made.").yellow());
            return Ok(());
        }
        if plan.is_empty() {
            println!("{}", style("No changes.").yellow());
            return if plan.errors.is_empty() {
                Ok(())
            } else {
                Err(miette::miette!("Edit finished with {} error(s)", plan.errors.len()))
            };
        }

        let prompt = if plan.deletes() > 0 {
            format!(
                "Apply {} change(s)? {} deletion(s) cannot be undone",
                plan.entries.len(),
                plan.deletes()
            )
        } else {
            format!("Apply {} change(s)?", plan.entries.len())
        };
        if !helpers::confirm(&prompt, args.yes)? {
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

/// Export to a temp file and open it in the configured editor
fn edit_in_editor(job: &BulkEditJob, config: &Config) -> Result<tempfile::NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("placeload-edit-")
        .suffix(".csv")
        .tempfile()
        .into_diagnostic()?;
    job.export_csv(file.as_file())
        .map_err(|e| miette::miette!("{}", e))?;

    println!(
        "Opening {} in {}...",
        style(file.path().display()).cyan(),
        style(config.editor()).yellow()
    );
    let status = config.run_editor(file.path()).into_diagnostic()?;
    if !status.success() {
        return Err(miette::miette!("Editor exited with {}; nothing applied", status));
    }
    Ok(file)
}

fn load_edits(job: &mut BulkEditJob, path: &Path, encoding: TextEncoding) -> Result<()> {
    let edited = parser::parse_file(path, None, encoding)
        .map_err(|e| miette::miette!("{}", e))?;
    let errors = job
        .load_edits(&edited)
        .map_err(|e| miette::miette!("{}", e))?;
    if !errors.is_empty() {
        eprintln!(
            "  {} {} row(s) in {} could not be matched",
            style("!").yellow(),
            errors.len(),
            path.display()
        );
    }
    Ok(())
}
