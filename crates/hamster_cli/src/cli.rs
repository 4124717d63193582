use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hamster", about = "Track time as free-form fact lines", version)]
pub struct Cli {
    /// SQLite database file
    #[arg(long, global = true, default_value = "hamster.db")]
    pub db: PathBuf,

    /// Tracking settings JSON file
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Absolute directory for rolling log files; logging is off without it
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a fact line and show its fields without storing it
    Parse {
        /// Fact line, e.g. `9:00-10:30 coding@work, notes #tag`
        #[arg(required = true, num_args = 1..)]
        line: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Store a fact line
    Add {
        #[arg(required = true, num_args = 1..)]
        line: Vec<String>,

        /// Do not close ongoing facts
        #[arg(long)]
        temporary: bool,
    },

    /// Close the ongoing fact of today
    Stop {
        /// End time such as `17:30` or `1730`; defaults to now
        #[arg(long)]
        at: Option<String>,
    },

    /// List facts of the current hamster day
    Today {
        /// Only facts matching every whitespace-separated term
        #[arg(long, default_value = "")]
        search: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a stored fact
    Remove {
        id: i64,
    },
}
