//! Command-line surface
//!
//! `restore` and `update` with missing required arguments are rejected
//! by clap with usage text and a non-zero exit, before any side effect.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "stackctl")]
#[command(about = "Backup, restore and update the managed stack", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Stack configuration file (KEY=VALUE)
    #[arg(long, global = true, default_value = "stack.env")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a backup artifact (database dump + state snapshots)
    Backup,

    /// Restore the stack from a backup artifact
    Restore {
        /// Path to a <prefix>_<YYYYMMDD_HHMMSS>.tar.gz artifact
        artifact: PathBuf,
    },

    /// Update service versions (pre-update backup, then restart)
    Update {
        /// Target application version
        #[arg(long)]
        app_version: Option<String>,

        /// Target database version
        #[arg(long)]
        db_version: Option<String>,

        /// Skip the breaking-change confirmation gate
        #[arg(long)]
        yes: bool,
    },

    /// Show service states and readiness
    Status,

    /// List backup artifacts, newest first
    List,
}
