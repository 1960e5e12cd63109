//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// UVGestor - Student finance tracker
#[derive(Parser)]
#[command(name = "uvgestor")]
#[command(about = "Track student expenses, incomes and monthly budgets", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path (defaults to the config file value, then the data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Config file path (defaults to ~/.local/share/uvgestor/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for real data)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set UVGESTOR_DB_KEY environment variable with your passphrase.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Create an account (providing a guardian marks the account as a minor's)
    Register {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        #[command(flatten)]
        guardian: GuardianArgs,
    },

    /// Sign in (falls back to the local account when the provider is unreachable)
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// Sign out and remove this account's local data
    Logout {
        /// Sign out even if some records never reached the remote store
        #[arg(long)]
        force: bool,
    },

    /// Show the signed-in user
    Whoami,

    /// Manage expenses (add, list, edit, delete)
    Expenses {
        #[command(subcommand)]
        action: Option<RecordsAction>,
    },

    /// Manage incomes (add, list, edit, delete)
    Incomes {
        #[command(subcommand)]
        action: Option<RecordsAction>,
    },

    /// Manage monthly budgets (set, show, list, delete)
    Budget {
        #[command(subcommand)]
        action: Option<BudgetAction>,
    },

    /// Show totals, balance, category breakdown and budget alerts
    Summary {
        /// Restrict to a period: Diario, Semanal, Mensual, Anual
        #[arg(short, long)]
        period: Option<String>,

        /// Reference date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Push unsynced records and merge the remote store's records
    Sync,
}

/// Guardian details for minors; all three or none
#[derive(Args, Default)]
pub struct GuardianArgs {
    #[arg(long, requires_all = ["guardian_email", "guardian_relationship"])]
    pub guardian_name: Option<String>,

    #[arg(long, requires = "guardian_name")]
    pub guardian_email: Option<String>,

    /// e.g. Madre, Padre, Tutor
    #[arg(long, requires = "guardian_name")]
    pub guardian_relationship: Option<String>,
}

#[derive(Subcommand)]
pub enum RecordsAction {
    /// Record a new entry
    Add {
        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        amount: f64,

        #[arg(short, long)]
        category: String,

        /// Period label: Diario, Semanal, Mensual, Anual
        #[arg(short, long, default_value = "Mensual")]
        period: String,

        /// Date (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<String>,
    },

    /// List entries, newest first
    List {
        /// Only entries inside a period: Diario, Semanal, Mensual, Anual
        #[arg(short, long)]
        period: Option<String>,

        /// Maximum number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Change fields of an entry
    Edit {
        /// Entry ID
        id: i64,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        amount: Option<f64>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        period: Option<String>,

        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Delete an entry
    Delete {
        /// Entry ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum BudgetAction {
    /// Set the limit for a month (replaces an existing budget for that month)
    Set {
        /// Limit in quetzales
        #[arg(short, long)]
        limit: f64,

        /// Month (YYYY-MM, defaults to the current month)
        #[arg(short, long)]
        month: Option<String>,

        /// Limit only this category instead of all spending
        #[arg(short, long)]
        category: Option<String>,

        /// Disable the 80% warning
        #[arg(long)]
        no_warn: bool,

        /// Disable the 100% alert
        #[arg(long)]
        no_exceeded: bool,
    },

    /// Show this month's budget and how much of it is spent
    Show,

    /// List all budgets
    List,

    /// Delete a budget
    Delete {
        /// Budget ID
        id: i64,
    },
}
