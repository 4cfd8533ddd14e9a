//! Shared helper functions for CLI commands
//!
//! Workspace discovery, the async runtime, confirmation prompts and the
//! progress/summary output every committing command uses.

use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::{IntoDiagnostic, Result};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::table;
use crate::cli::GlobalOpts;
use crate::core::{Config, SqliteStore, Workspace};
use crate::pipeline::{BatchOptions, Progress, RunState, RunSummary, TextEncoding};

/// Find the workspace from `--workspace` or the current directory
pub fn open_workspace(global: &GlobalOpts) -> Result<Workspace> {
    let found = match &global.workspace {
        Some(path) => Workspace::discover_from(path),
        None => Workspace::discover(),
    };
    found.map_err(|e| miette::miette!("{}", e))
}

/// clap value parser for `--encoding`
pub fn parse_encoding(s: &str) -> Result<TextEncoding, String> {
    s.parse()
}

/// Resolve a source encoding: flag, then config, then utf-8
pub fn resolve_encoding(flag: Option<TextEncoding>, config: &Config) -> Result<TextEncoding> {
    if let Some(encoding) = flag {
        return Ok(encoding);
    }
    match &config.encoding {
        Some(name) => name.parse().map_err(|e: String| miette::miette!("config: {}", e)),
        None => Ok(TextEncoding::default()),
    }
}

pub fn open_store(workspace: &Workspace) -> Result<SqliteStore> {
    SqliteStore::open(&workspace.store_path()).map_err(|e| miette::miette!("{}", e))
}

/// Single-threaded runtime; all concurrency is I/O wait on the store
pub fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()
}

/// A token that fires on Ctrl-C. Must be called inside the runtime.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!(
                "{} Cancelling: finishing the current batch...",
                style("!").yellow()
            );
            trigger.cancel();
        }
    });
    cancel
}

/// Batch settings from config, with command-line overrides
pub fn batch_options(config: &Config, size: Option<usize>, delay_ms: Option<u64>) -> BatchOptions {
    let mut options = BatchOptions::from_config(config);
    if let Some(size) = size.filter(|&n| n > 0) {
        options.batch_size = size;
    }
    if let Some(ms) = delay_ms {
        options.batch_delay = std::time::Duration::from_millis(ms);
    }
    options
}

/// Ask before touching the store. Without a terminal, `--yes` is required.
pub fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    if !console::user_attended() {
        return Err(miette::miette!(
            "refusing to apply changes without confirmation; pass --yes to run non-interactively"
        ));
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .into_diagnostic()
}

/// Progress callback printing `processed/total` on one stderr line
pub fn progress_printer(quiet: bool) -> impl FnMut(Progress) {
    move |p: Progress| {
        if quiet {
            return;
        }
        eprint!("\r{} {}/{} entries", style("→").blue(), p.processed, p.total);
        if p.processed == p.total {
            eprintln!();
        }
    }
}

/// Row numbers are shown 1-based, matching a spreadsheet's data rows
pub fn display_row(row_index: usize) -> usize {
    row_index + 1
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a run summary (JSON on `--format json`) and turn a partial failure
/// into a non-zero exit
pub fn report_summary(summary: &RunSummary, global: &GlobalOpts, show_errors: bool) -> Result<()> {
    if global.format.is_json() {
        println!(
            "{}",
            serde_json::to_string_pretty(summary).into_diagnostic()?
        );
    } else {
        println!();
        println!("{}", style("─".repeat(50)).dim());
        println!("{}", style(format!("{} Summary", capitalize(&summary.kind.to_string()))).bold());
        println!("{}", style("─".repeat(50)).dim());
        println!("  Job:       {}", style(summary.job_id).cyan());
        println!("  State:     {}", state_style(summary.state));
        println!("  Created:   {}", style(summary.created).green());
        println!("  Updated:   {}", style(summary.updated).yellow());
        if summary.deleted > 0 {
            println!("  Deleted:   {}", style(summary.deleted).red());
        }
        if summary.unchanged > 0 {
            println!("  Unchanged: {}", style(summary.unchanged).dim());
        }
        if summary.skipped > 0 {
            println!("  Skipped:   {}", style(summary.skipped).dim());
        }
        if summary.errors > 0 {
            println!("  Errors:    {}", style(summary.errors).red());
            if show_errors {
                println!();
                println!("{}", table::errors(&summary.error_details));
            } else if !global.quiet {
                println!("  {}", style("Re-run with --errors for the per-row breakdown").dim());
            }
        }
        if summary.is_undoable() && !global.quiet {
            println!();
            println!(
                "Undo this run with {}",
                style(format!("placeload undo {}", summary.job_id)).yellow()
            );
        }
    }

    match summary.state {
        RunState::PartiallyFailed => Err(miette::miette!(
            "{} finished with {} error(s)",
            capitalize(&summary.kind.to_string()),
            summary.errors
        )),
        RunState::Cancelled => {
            warn!(skipped = summary.skipped, "run cancelled");
            Ok(())
        }
        _ => Ok(()),
    }
}

fn state_style(state: RunState) -> console::StyledObject<String> {
    let text = state.to_string();
    match state {
        RunState::Completed => style(text).green(),
        RunState::PartiallyFailed => style(text).red(),
        _ => style(text).yellow(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
