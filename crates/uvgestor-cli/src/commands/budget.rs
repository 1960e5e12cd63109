//! Budget command implementations (set, show, list, delete)

use anyhow::{anyhow, Result};
use uvgestor_core::models::month_year;
use uvgestor_core::stats::{
    aggregate_by_category, aggregate_totals, compute_budget_percentage, evaluate_alert,
};
use uvgestor_core::{Budget, BudgetAlert, NewBudget};

use super::core::{money, today, App};

fn scope(budget: &Budget) -> &str {
    budget.category.as_deref().unwrap_or("All spending")
}

fn print_progress(budget: &Budget, spent: f64) {
    let percentage = compute_budget_percentage(spent, Some(budget));
    let alert = evaluate_alert(spent, Some(budget));
    let icon = match alert {
        BudgetAlert::None => "🟢",
        BudgetAlert::Warn80 => "🟡",
        BudgetAlert::Exceeded100 => "🔴",
    };

    println!(
        "   {} {:<14} {} / {} ({}%)",
        icon,
        scope(budget),
        money(spent),
        money(budget.limit_amount),
        percentage
    );
    if let Some(message) = alert.message(spent, budget) {
        println!("      {}", message);
    }
}

pub async fn cmd_budget_set(
    app: &App,
    limit: f64,
    month: Option<&str>,
    category: Option<&str>,
    no_warn: bool,
    no_exceeded: bool,
) -> Result<()> {
    let session = app.require_session().await?;
    let budget = NewBudget {
        month_year: month
            .map(|m| m.trim().to_string())
            .unwrap_or_else(|| month_year(today())),
        limit_amount: limit,
        category: category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
        alert_at_80_percent: !no_warn,
        alert_at_100_percent: !no_exceeded,
    };

    let saved = app.budgets.save_budget(session.user_id(), budget)?;

    println!(
        "✅ Budget for {} set: {} ({})",
        saved.month_year,
        money(saved.limit_amount),
        scope(&saved)
    );
    if !saved.alert_at_80_percent {
        println!("   80% warning disabled");
    }
    if !saved.alert_at_100_percent {
        println!("   100% alert disabled");
    }
    Ok(())
}

pub async fn cmd_budget_show(app: &App) -> Result<()> {
    let session = app.require_session().await?;
    let user_id = session.user_id();
    let today = today();
    let month = month_year(today);

    let budgets: Vec<Budget> = app
        .budgets
        .list_budgets(user_id)?
        .into_iter()
        .filter(|b| b.month_year == month)
        .collect();

    if budgets.is_empty() {
        println!("No budget for {}. Set one with:", month);
        println!("  uvgestor budget set --limit 1000");
        return Ok(());
    }

    let expenses = app.expenses.records_by_period(user_id, "Mensual", today)?;
    let by_category = aggregate_by_category(&expenses);

    println!();
    println!("📋 Budget for {}", month);
    println!("   ─────────────────────────────────────────────");
    for budget in &budgets {
        let spent = match &budget.category {
            None => aggregate_totals(&expenses),
            Some(category) => by_category.get(category).copied().unwrap_or(0.0),
        };
        print_progress(budget, spent);
    }
    Ok(())
}

pub async fn cmd_budget_list(app: &App) -> Result<()> {
    let session = app.require_session().await?;
    let budgets = app.budgets.list_budgets(session.user_id())?;

    if budgets.is_empty() {
        println!("No budgets yet.");
        return Ok(());
    }

    println!();
    println!("📋 Budgets");
    println!("   ─────────────────────────────────────────────");
    for budget in budgets {
        println!(
            "   [{:>3}] {} │ {:>10} │ {}",
            budget.id,
            budget.month_year,
            money(budget.limit_amount),
            scope(&budget)
        );
    }
    Ok(())
}

pub async fn cmd_budget_delete(app: &App, id: i64) -> Result<()> {
    let session = app.require_session().await?;
    let budget = app
        .budgets
        .get_budget(id)?
        .filter(|b| b.user_id == session.user_id())
        .ok_or_else(|| anyhow!("Budget {} not found", id))?;

    app.budgets.delete_budget(id)?;
    println!(
        "🗑️  Deleted budget {} ({}, {})",
        id,
        budget.month_year,
        scope(&budget)
    );
    Ok(())
}
