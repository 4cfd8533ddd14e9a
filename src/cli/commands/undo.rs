//! `placeload undo` command - Reverse a committed run

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers;
use crate::cli::table;
use crate::cli::GlobalOpts;
use crate::core::{Config, JobId, LedgerError};
use crate::pipeline::{undo, RunState};

#[derive(clap::Args, Debug)]
pub struct UndoArgs {
    /// Job to undo (default: the most recent pending job)
    pub job: Option<JobId>,

    /// List pending jobs that can still be undone
    #[arg(long, conflicts_with = "dismiss")]
    pub list: bool,

    /// Forget the job's undo information without undoing anything
    #[arg(long)]
    pub dismiss: bool,

    /// Undo without asking for confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Entries per batch (default from config)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Pause between batches in milliseconds (default from config)
    #[arg(long)]
    pub batch_delay_ms: Option<u64>,
}

pub fn run(args: UndoArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = helpers::open_workspace(global)?;
    let config = Config::load(Some(&workspace));
    let ledgers = workspace.ledgers();

    if args.list {
        let infos = ledgers.list().map_err(|e| miette::miette!("{}", e))?;
        if global.format.is_json() {
            println!("{}", serde_json::to_string_pretty(&infos).into_diagnostic()?);
        } else if infos.is_empty() {
            println!("{}", style("Nothing to undo.").dim());
        } else {
            println!("{}", table::ledgers(&infos));
        }
        return Ok(());
    }

    let job_id = match args.job {
        Some(id) => id,
        None => match ledgers.latest() {
            Ok(id) => id,
            Err(LedgerError::NonePending) => {
                println!("{}", style("Nothing to undo.").dim());
                return Ok(());
            }
            Err(e) => return Err(miette::miette!("{}", e)),
        },
    };

    if args.dismiss {
        ledgers
            .discard(job_id)
            .map_err(|e| miette::miette!("{}", e))?;
        println!(
            "{} Dismissed undo for {}",
            style("✓").green(),
            style(job_id).cyan()
        );
        return Ok(());
    }

    let ledger = ledgers.load(job_id).map_err(|e| miette::miette!("{}", e))?;
    if !global.quiet && !global.format.is_json() {
        eprintln!(
            "{} Undo {} {} from {}: delete {} created, restore {} updated",
            style("→").blue(),
            ledger.kind(),
            style(job_id).cyan(),
            style(ledger.source()).yellow(),
            ledger.created_ids().len(),
            ledger.updated_snapshots().len()
        );
    }
    if !helpers::confirm("Undo this run?", args.yes)? {
        println!("Aborted.");
        return Ok(());
    }

    // Single-shot: the ledger leaves disk before the first store call
    let ledger = ledgers.take(job_id).map_err(|e| miette::miette!("{}", e))?;

    let rt = helpers::runtime()?;
    let report = rt.block_on(async {
        let store = helpers::open_store(&workspace)?;
        let options = helpers::batch_options(&config, args.batch_size, args.batch_delay_ms);
        Ok::<_, miette::Report>(
            undo::undo(
                ledger,
                &store,
                options,
                helpers::cancel_on_ctrl_c(),
                helpers::progress_printer(global.quiet || global.format.is_json()),
            )
            .await,
        )
    })?;

    if global.format.is_json() {
        println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
    } else {
        println!();
        println!("  Deleted:  {}", style(report.deleted).green());
        println!("  Restored: {}", style(report.restored).green());
        if !report.failures.is_empty() {
            println!("  Failed:   {}", style(report.failures.len()).red());
            for failure in &report.failures {
                println!("    {} {}", style(failure.id).cyan(), failure.message);
            }
        }
    }

    match report.state {
        RunState::Cancelled => Err(miette::miette!(
            "Undo cancelled; {} deleted and {} restored before stopping",
            report.deleted,
            report.restored
        )),
        _ if !report.failures.is_empty() => Err(miette::miette!(
            "Undo finished with {} failure(s)",
            report.failures.len()
        )),
        _ => Ok(()),
    }
}
