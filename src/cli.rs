use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

/// vaultrun - backup-run orchestrator
#[derive(Debug, Parser)]
#[command(name = "vaultrun")]
#[command(about = "Runs hook scripts around a restic-style backup engine")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: show what would be executed without making changes.
    ///
    /// Mutating engine operations (init, backup, forget) are skipped and
    /// logged. Read-only operations (initialization check, stats) still
    /// execute so the final report stays realistic. Hooks are surfaced in
    /// a no-exec echo mode instead of running.
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Verbose mode: enable informational/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initialize a repository (all configured repositories if none given)
    Init {
        /// Repository to initialize
        repo: Option<String>,
    },
    /// Run the backup sequence for all scripts, or a single named script
    Backup {
        /// Script file name inside the scripts directory
        script: Option<String>,
    },
    /// Print backup statistics for one repository or all known repositories
    Report {
        /// Repository to report on
        repo: Option<String>,
    },
}

impl Cli {
    /// Parse the command line, exiting 1 on any usage error.
    ///
    /// Help and version output still exit 0; everything else that stops the
    /// program is an error, and errors exit 1.
    pub fn parse_args() -> Self {
        match <Self as clap::Parser>::try_parse() {
            Ok(cli) => cli,
            Err(e) => {
                let code = if e.use_stderr() { 1 } else { 0 };
                let _ = e.print();
                std::process::exit(code);
            }
        }
    }
}
