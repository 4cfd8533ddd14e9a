//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    edit::EditArgs, import::ImportArgs, init::InitArgs, list::ListArgs, template::TemplateArgs,
    undo::UndoArgs,
};

#[derive(Parser)]
#[command(name = "placeload")]
#[command(author, version, about = "Bulk import, edit and undo for place records")]
#[command(
    long_about = "Load places from CSV or spreadsheet files, edit them in bulk, and undo a whole run in one step."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging to stderr)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Workspace root (default: auto-detect by finding .placeload/)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new placeload workspace
    Init(InitArgs),

    /// Import places from a CSV or spreadsheet file
    Import(ImportArgs),

    /// Bulk edit stored places through a CSV file
    Edit(EditArgs),

    /// Undo the most recent run (or a given job)
    Undo(UndoArgs),

    /// List stored places
    List(ListArgs),

    /// Print a CSV template with every importable column
    Template(TemplateArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable tables
    #[default]
    Auto,
    /// Same as auto
    Table,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        *self == OutputFormat::Json
    }
}
