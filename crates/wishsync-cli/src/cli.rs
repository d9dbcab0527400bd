use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use wishsync_core::ResolutionStrategy;

#[derive(Parser)]
#[command(name = "wishsync")]
#[command(about = "Inspect and drain the offline wishlist action queue")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local queue database file
    #[arg(long, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show queue counts by status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List queued actions, oldest first
    List {
        /// Number of actions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay queued actions against the configured endpoint
    Drain,
    /// List actions blocked on an unresolved conflict
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a conflicted action
    Resolve {
        /// Action id (from `wishsync conflicts`)
        id: i64,
        /// Which version wins
        #[arg(value_enum)]
        strategy: Strategy,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Strategy {
    /// Keep the local offline edit, overwriting the server
    Local,
    /// Keep the server version, discarding the local edit
    Server,
}

impl From<Strategy> for ResolutionStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Local => Self::Local,
            Strategy::Server => Self::Server,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
