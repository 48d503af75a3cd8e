use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mclock")]
#[command(about = "Management console resource lock manager", long_about = None)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Configuration preset used when no file is given
    #[arg(long, global = true, default_value = "production")]
    pub preset: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a script of lock operations against a fresh lock table
    Replay {
        /// Script file (JSON array of operations)
        #[arg(short, long)]
        script: PathBuf,

        /// Print the audit trail after the run
        #[arg(long, default_value_t = false)]
        audit: bool,
    },

    /// Validate a batch of lock requests without granting it
    Check {
        /// File holding a JSON array of lock requests
        #[arg(short, long)]
        request: PathBuf,
    },

    /// Show the effective configuration
    ShowConfig,
}
