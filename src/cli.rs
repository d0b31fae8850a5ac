use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use logbox::model::Severity;

#[derive(Parser, Debug)]
#[command(name = "logbox")]
#[command(about = "Inspect and maintain a logbox store", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $LOGBOX_CONFIG or config/logbox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show record, session and disk usage totals
    Stats,
    /// List sessions, newest first
    Sessions,
    /// Apply the age cutoff if the store exceeds its size budget
    Rotate,
    /// Apply the age cutoff unconditionally
    Cleanup,
    /// Write matching records as text lines
    Export(ExportArgs),
    /// Run a deep search and print the matches
    Search(SearchArgs),
    /// Bulk-delete records
    Delete(DeleteArgs),
}

#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Restrict to these sessions
    #[arg(long)]
    pub session: Vec<String>,

    /// Restrict to these severities
    #[arg(long)]
    pub severity: Vec<Severity>,

    /// Output file (stdout when omitted)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = logbox::store::export::DEFAULT_EXPORT_BATCH)]
    pub batch_size: usize,
}

#[derive(clap::Args, Debug)]
pub struct SearchArgs {
    pub text: String,

    /// Continue past the preview into every older session
    #[arg(long)]
    pub full: bool,

    /// Restrict to these sessions
    #[arg(long)]
    pub session: Vec<String>,

    /// Matching records to print
    #[arg(long, default_value_t = 20)]
    pub show: usize,
}

/// Exactly one of `--session`, `--before-days`, `--date` or `--all`
#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Delete these sessions
    #[arg(long)]
    pub session: Vec<String>,

    /// Delete records older than this many days
    #[arg(long)]
    pub before_days: Option<u32>,

    /// Delete one UTC day (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Narrow `--date` to one hour (0-23)
    #[arg(long, requires = "date", value_parser = clap::value_parser!(u32).range(0..24))]
    pub hour: Option<u32>,

    /// Delete everything
    #[arg(long)]
    pub all: bool,
}
