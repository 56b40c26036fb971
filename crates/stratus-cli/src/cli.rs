use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use stratus_core::MergeStrategy;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Keep notes in sync across devices through one remote backup")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for remote and encryption settings
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note title
        #[arg(short, long)]
        title: Option<String>,
        /// Note content
        #[arg(required = true)]
        content: Vec<String>,
    },
    /// List recent notes
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a note
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Sync the local dataset with the remote backup
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        /// Conflict strategy for this run
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// Output the sync result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show sync metadata and remote configuration
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the local dataset as a snapshot JSON file
    Export {
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Load a snapshot JSON file (plain or encrypted) into the local dataset
    Import {
        /// Snapshot file to import
        path: PathBuf,
        /// Replace local collections instead of merging into them
        #[arg(long)]
        replace: bool,
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
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage the encryption passphrase in the OS keychain
    Passphrase {
        #[command(subcommand)]
        command: PassphraseCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StrategyArg {
    /// Newest edit wins, local on ties
    Merge,
    /// Local copy wins every conflict
    Local,
    /// Remote copy wins every conflict
    Remote,
    /// Report conflicts and upload nothing
    Manual,
}

impl From<StrategyArg> for MergeStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Merge => Self::Merge,
            StrategyArg::Local => Self::Local,
            StrategyArg::Remote => Self::Remote,
            StrategyArg::Manual => Self::Manual,
        }
    }
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// List recorded sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync periodically until interrupted, then run a final sync
    Watch {
        /// Seconds between syncs (profile or STRATUS_SYNC_INTERVAL_SECS when omitted)
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update a profile
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Remote blob store base URL
        #[arg(long, value_name = "URL")]
        remote_url: Option<String>,
        /// Bearer token for the remote (stored in the OS keychain)
        #[arg(long, value_name = "TOKEN")]
        remote_token: Option<String>,
        /// Remote folder holding the backup
        #[arg(long, value_name = "NAME")]
        app_folder: Option<String>,
        /// Backup file name
        #[arg(long, value_name = "NAME")]
        backup_file: Option<String>,
        /// Default conflict strategy
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// Encrypt uploads with the stored passphrase
        #[arg(long)]
        encryption: Option<bool>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show,
}

#[derive(Subcommand)]
pub enum PassphraseCommands {
    /// Store the passphrase (read from stdin when omitted)
    Set {
        passphrase: Option<String>,
    },
    /// Remove the stored passphrase
    Clear,
    /// Report whether a passphrase is stored
    Status,
}
