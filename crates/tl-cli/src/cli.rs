//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tl_core::SessionId;

/// Personal time tracker driven by a one-line log notation.
///
/// Sessions are started, interrupted and stopped from the command line, or
/// imported from a log file written in the same notation.
#[derive(Debug, Parser)]
#[command(name = "tl", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start a session, e.g. `tl start Write report @work +docs ~1h`.
    Start(NotationArgs),

    /// Stop the active session and any session it interrupted.
    Stop(AtArgs),

    /// Pause the active session; continue it later with `tl start @resume`.
    Pause(AtArgs),

    /// End the active interruption and return to the interrupted session.
    Resume(AtArgs),

    /// Interrupt the active session with another one.
    Interrupt(NotationArgs),

    /// Abandon the active session.
    Abandon(AtArgs),

    /// Import a log file. Nothing is stored if any line fails to parse.
    Import {
        /// Log file to read.
        file: PathBuf,

        /// Date for clock times before the first dated line (default: today).
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// List the sessions of a day.
    List {
        /// Day to list (default: today).
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the sessions of a day as log notation.
    Export {
        /// Day to export (default: today).
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show the active session and paused work.
    Status,

    /// Delete a session and its interruptions.
    Delete {
        /// Session ID as shown by `tl list`.
        id: SessionId,
    },
}

/// A session body in log notation plus an optional time.
#[derive(Debug, Args)]
pub struct NotationArgs {
    /// Description and markers, e.g. `Review PR @work +code ~30m`.
    #[arg(required = true, num_args = 1..)]
    pub notation: Vec<String>,

    #[command(flatten)]
    pub at: AtArgs,
}

/// When a command takes effect.
#[derive(Debug, Args)]
pub struct AtArgs {
    /// `H:MM[:SS]`, `YYYY-MM-DD H:MM`, RFC 3339 or `N minutes ago` (default: now).
    #[arg(long)]
    pub at: Option<String>,
}
