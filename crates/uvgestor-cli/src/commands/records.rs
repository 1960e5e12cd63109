//! Expense and income command implementations (add, list, edit, delete)

use anyhow::{anyhow, Context, Result};
use uvgestor_core::db::RecordChanges;
use uvgestor_core::stats::aggregate_totals;
use uvgestor_core::{NewRecord, Record, RecordKind, TimePeriod};

use super::core::{money, parse_date, today, App};
use super::truncate;

/// Accepts the stored tags and their English names, in any case
pub fn parse_period(period: &str) -> Result<TimePeriod> {
    period.parse().map_err(|e: String| anyhow!(e))
}

fn label(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Expense => "expense",
        RecordKind::Income => "income",
    }
}

/// A record of this kind belonging to the signed-in user
async fn owned_record(app: &App, kind: RecordKind, id: i64) -> Result<Record> {
    let session = app.require_session().await?;
    app.repo(kind)
        .get_record(id)?
        .filter(|r| r.user_id == session.user_id())
        .ok_or_else(|| anyhow!("{} {} not found", label(kind), id))
}

fn print_record(record: &Record) {
    let amount_str = match record.kind {
        RecordKind::Expense => format!("\x1b[31m{:>10}\x1b[0m", money(record.amount)), // Red for expenses
        RecordKind::Income => format!("\x1b[32m{:>10}\x1b[0m", money(record.amount)), // Green for incomes
    };
    let sync_mark = if record.synced_with_remote { " " } else { "*" };

    println!(
        "   [{:>4}]{} {} │ {} │ {:<8} │ {:<12} │ {}",
        record.id,
        sync_mark,
        record.date,
        amount_str,
        record.time_period.as_str(),
        truncate(&record.category, 12),
        truncate(&record.title, 30)
    );
}

pub async fn cmd_records_add(
    app: &App,
    kind: RecordKind,
    title: &str,
    amount: f64,
    category: &str,
    period: &str,
    date: Option<&str>,
) -> Result<()> {
    let session = app.require_session().await?;
    let record = NewRecord::new(title, amount, parse_period(period)?, category, parse_date(date)?);

    let stored = app.repo(kind).add_record(session.user_id(), record).await?;
    app.flush().await;

    let synced = app
        .repo(kind)
        .get_record(stored.id)?
        .is_some_and(|r| r.synced_with_remote);

    println!("✅ Added {} {}:", label(kind), stored.id);
    print_record(&stored);
    if !synced {
        println!();
        println!("   Saved on this device only. Run 'uvgestor sync' to upload it later.");
    }
    Ok(())
}

pub async fn cmd_records_list(
    app: &App,
    kind: RecordKind,
    period: Option<&str>,
    limit: usize,
) -> Result<()> {
    let session = app.require_session().await?;
    let repo = app.repo(kind);
    let records = match period {
        Some(tag) => {
            let period = parse_period(tag)?;
            repo.records_by_period(session.user_id(), period.as_str(), today())?
        }
        None => repo.list_local(session.user_id())?,
    };

    if records.is_empty() {
        println!("No {}s found. Add one with:", label(kind));
        println!(
            "  uvgestor {}s add --title ... --amount ... --category ...",
            label(kind)
        );
        return Ok(());
    }

    println!();
    match kind {
        RecordKind::Expense => println!("💸 Expenses"),
        RecordKind::Income => println!("💰 Incomes"),
    }
    println!("   ─────────────────────────────────────────────────────────────");

    for record in records.iter().take(limit) {
        print_record(record);
    }

    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   Total: {} ({} entries)",
        money(aggregate_totals(&records)),
        records.len()
    );
    if records.iter().any(|r| !r.synced_with_remote) {
        println!("   * not yet uploaded to the remote store");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_records_edit(
    app: &App,
    kind: RecordKind,
    id: i64,
    title: Option<String>,
    amount: Option<f64>,
    category: Option<String>,
    period: Option<&str>,
    date: Option<&str>,
) -> Result<()> {
    let changes = RecordChanges {
        title,
        amount,
        time_period: period.map(parse_period).transpose()?,
        category,
        date: date.map(|d| parse_date(Some(d))).transpose()?,
    };
    if changes.is_empty() {
        println!("Nothing to change. Pass at least one of --title, --amount, --category, --period, --date.");
        return Ok(());
    }
    owned_record(app, kind, id).await?;

    let updated = app
        .repo(kind)
        .update_record(id, changes)
        .await?
        .with_context(|| format!("{} {} not found", label(kind), id))?;
    app.flush().await;

    println!("✅ Updated {} {}:", label(kind), id);
    print_record(&updated);
    Ok(())
}

pub async fn cmd_records_delete(app: &App, kind: RecordKind, id: i64) -> Result<()> {
    let record = owned_record(app, kind, id).await?;

    app.repo(kind).delete_record(id).await?;

    println!("🗑️  Deleted {} {}:", label(kind), id);
    print_record(&record);
    Ok(())
}
