//! CLI definitions using clap.

use clap::Parser;
use std::path::PathBuf;

pub mod commands;

/// Mirror a Jira project's versions, issues, worklogs and hierarchy into SQLite.
///
/// With no VERSIONS, every non-archived version and the unscheduled bucket
/// are synced. With VERSIONS, only those versions are synced (archived or
/// not) and hierarchy linking is limited to them.
#[derive(Parser, Debug)]
#[command(name = "jiramirror", author, version, about, long_about = None)]
pub struct Cli {
    /// Version names to sync (default: all non-archived versions)
    pub versions: Vec<String>,

    /// Database path (default: ~/.jiramirror/data/mirror.db)
    #[arg(long, env = "JIRAMIRROR_DB")]
    pub db: Option<PathBuf>,

    /// Config file path (default: ~/.jiramirror/config.json)
    #[arg(long, env = "JIRAMIRROR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project key, overriding the config file and JIRA_PROJECT
    #[arg(long)]
    pub project: Option<String>,

    /// Actor name for audit trail (default: the tracker username)
    #[arg(long, env = "JIRAMIRROR_ACTOR")]
    pub actor: Option<String>,

    /// Output the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}
