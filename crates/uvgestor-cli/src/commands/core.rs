//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `App` - The services every command works through
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use uvgestor_core::db::DB_KEY_ENV;
use uvgestor_core::{
    AppConfig, AuthService, BudgetService, Database, IdentityClient, RecordKind, RecordRepository,
    RemoteClient, Session,
};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", db_path.display()))?;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load config (file + environment), letting `--db` and `--no-encrypt` win
pub fn load_config(
    config_path: Option<&Path>,
    db: Option<&Path>,
    no_encrypt: bool,
) -> Result<AppConfig> {
    let mut config = AppConfig::load(config_path).context("Failed to load config")?;
    if let Some(db) = db {
        config.database.path = db.to_path_buf();
    }
    if no_encrypt {
        config.database.encrypt = false;
    }
    Ok(config)
}

/// The services a command runs against
pub struct App {
    pub expenses: RecordRepository,
    pub incomes: RecordRepository,
    pub budgets: BudgetService,
    pub auth: AuthService,
    pub remote: RemoteClient,
}

impl App {
    /// Open the database and build remote/identity clients from config
    pub fn open(config: &AppConfig) -> Result<Self> {
        let db = open_db(&config.database.path, !config.database.encrypt)?;
        let remote = RemoteClient::from_config(config.remote.as_ref())
            .context("Failed to configure remote store")?;
        let identity = IdentityClient::from_config(config.identity.as_ref())
            .context("Failed to configure identity provider")?;
        Ok(Self::from_parts(db, remote, identity))
    }

    pub fn from_parts(db: Database, remote: RemoteClient, identity: IdentityClient) -> Self {
        let expenses = RecordRepository::expenses(db.clone(), remote.clone());
        let incomes = RecordRepository::incomes(db.clone(), remote.clone());
        let budgets = BudgetService::new(db.clone());
        let auth = AuthService::new(db, identity)
            .with_local_views(&[expenses.clone(), incomes.clone()], &budgets);
        Self {
            expenses,
            incomes,
            budgets,
            auth,
            remote,
        }
    }

    pub fn repo(&self, kind: RecordKind) -> &RecordRepository {
        match kind {
            RecordKind::Expense => &self.expenses,
            RecordKind::Income => &self.incomes,
        }
    }

    /// The signed-in user, or an error telling them to log in
    pub async fn require_session(&self) -> Result<Session> {
        self.auth
            .current_session()
            .await?
            .context("Not signed in. Run 'uvgestor login' or 'uvgestor register' first")
    }

    /// Wait for background upstream writes before the process exits
    pub async fn flush(&self) {
        self.expenses.flush_pending().await;
        self.incomes.flush_pending().await;
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse an optional `YYYY-MM-DD` argument, defaulting to today
pub fn parse_date(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}' (use YYYY-MM-DD)", s)),
        None => Ok(today()),
    }
}

/// Format an amount in quetzales
pub fn money(amount: f64) -> String {
    format!("Q{:.2}", amount)
}

pub fn cmd_init(config: &AppConfig) -> Result<()> {
    let db_path = &config.database.path;
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, !config.database.encrypt)?;

    if db.is_encrypted() {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    }
    match &config.remote {
        Some(remote) => println!("   ☁️  Remote store: {}", remote.url),
        None => println!("   📴 Remote store: none (records stay on this device)"),
    }
    match &config.identity {
        Some(identity) => println!("   🔑 Identity provider: {}", identity.url),
        None => println!("   🔑 Identity provider: none (device-local accounts)"),
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Create an account: uvgestor register --email you@uvg.edu --password ... --name You");
    println!("  2. Record an expense: uvgestor expenses add --title Almuerzo --amount 35 --category Comida");

    Ok(())
}
