//! UVGestor CLI - Student finance tracker
//!
//! Usage:
//!   uvgestor init                       Initialize database
//!   uvgestor register --email ...       Create an account
//!   uvgestor expenses add --title ...   Record an expense
//!   uvgestor summary --period Mensual   Totals and budget alerts
//!   uvgestor sync                       Upload pending records

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uvgestor_core::RecordKind;

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref(), cli.db.as_deref(), cli.no_encrypt)?;

    if let Commands::Init = cli.command {
        return commands::cmd_init(&config);
    }

    let app = commands::App::open(&config)?;
    let result = run(&app, cli.command).await;
    app.flush().await;
    result
}

async fn run(app: &commands::App, command: Commands) -> Result<()> {
    match command {
        Commands::Init => Ok(()),
        Commands::Register {
            email,
            password,
            name,
            guardian,
        } => commands::cmd_register(app, &email, &password, &name, guardian).await,
        Commands::Login { email, password } => commands::cmd_login(app, &email, &password).await,
        Commands::Logout { force } => commands::cmd_logout(app, force).await,
        Commands::Whoami => commands::cmd_whoami(app).await,
        Commands::Expenses { action } => records(app, RecordKind::Expense, action).await,
        Commands::Incomes { action } => records(app, RecordKind::Income, action).await,
        Commands::Budget { action } => match action {
            None | Some(BudgetAction::Show) => commands::cmd_budget_show(app).await,
            Some(BudgetAction::Set {
                limit,
                month,
                category,
                no_warn,
                no_exceeded,
            }) => {
                commands::cmd_budget_set(
                    app,
                    limit,
                    month.as_deref(),
                    category.as_deref(),
                    no_warn,
                    no_exceeded,
                )
                .await
            }
            Some(BudgetAction::List) => commands::cmd_budget_list(app).await,
            Some(BudgetAction::Delete { id }) => commands::cmd_budget_delete(app, id).await,
        },
        Commands::Summary { period, date } => {
            commands::cmd_summary(app, period.as_deref(), date.as_deref()).await
        }
        Commands::Sync => commands::cmd_sync(app).await,
    }
}

async fn records(app: &commands::App, kind: RecordKind, action: Option<RecordsAction>) -> Result<()> {
    match action {
        None => commands::cmd_records_list(app, kind, None, 20).await,
        Some(RecordsAction::List { period, limit }) => {
            commands::cmd_records_list(app, kind, period.as_deref(), limit).await
        }
        Some(RecordsAction::Add {
            title,
            amount,
            category,
            period,
            date,
        }) => {
            commands::cmd_records_add(
                app,
                kind,
                &title,
                amount,
                &category,
                &period,
                date.as_deref(),
            )
            .await
        }
        Some(RecordsAction::Edit {
            id,
            title,
            amount,
            category,
            period,
            date,
        }) => {
            commands::cmd_records_edit(
                app,
                kind,
                id,
                title,
                amount,
                category,
                period.as_deref(),
                date.as_deref(),
            )
            .await
        }
        Some(RecordsAction::Delete { id }) => commands::cmd_records_delete(app, kind, id).await,
    }
}
