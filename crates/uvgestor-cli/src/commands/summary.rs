//! Summary command: totals, balance, category breakdown and the budget alert

use anyhow::Result;
use uvgestor_core::{BudgetAlert, FinancialSummary};

use super::core::{money, parse_date, App};
use super::records::parse_period;

pub async fn cmd_summary(app: &App, period: Option<&str>, date: Option<&str>) -> Result<()> {
    let session = app.require_session().await?;
    let user_id = session.user_id();
    let reference = parse_date(date)?;
    let period = period.map(parse_period).transpose()?;

    let expenses = app.expenses.list_local(user_id)?;
    let incomes = app.incomes.list_local(user_id)?;
    let budget = app.budgets.current_month_budget(user_id, reference)?;

    let summary = match period {
        Some(p) => FinancialSummary::for_period(
            &expenses,
            &incomes,
            budget.as_ref(),
            p.as_str(),
            reference,
        ),
        None => FinancialSummary::compute(&expenses, &incomes, budget.as_ref()),
    };

    println!();
    println!("╭─────────────────────────────────────────╮");
    println!("│           💰 UVGestor Summary           │");
    println!("╰─────────────────────────────────────────╯");
    println!();
    if let Some(p) = period {
        println!("  Period:          {} (around {})", p.as_str(), reference);
    }
    println!("  Incomes:         {}", money(summary.total_incomes));
    println!("  Expenses:        {}", money(summary.total_expenses));
    println!("  Balance:         {}", money(summary.balance));

    if !summary.expenses_by_category.is_empty() {
        println!();
        println!("  📊 Expenses by category");
        for (category, amount) in &summary.expenses_by_category {
            let share = if summary.total_expenses > 0.0 {
                amount * 100.0 / summary.total_expenses
            } else {
                0.0
            };
            println!("     {:<16} {:>10} ({:.0}%)", category, money(*amount), share);
        }
    }

    println!();
    match &budget {
        Some(b) => println!(
            "  📋 Budget {}:  {}% used of {}",
            b.month_year,
            summary.budget_percentage,
            money(b.limit_amount)
        ),
        None => println!("  📋 No budget set for this month"),
    }

    if !summary.alert.is_active() {
        if budget.is_some() {
            println!("  ✅ Spending is within budget");
        }
    } else if let Some(message) = &summary.alert_message {
        let icon = match summary.alert {
            BudgetAlert::Exceeded100 => "🔴",
            _ => "⚠️ ",
        };
        println!();
        println!("  {} {}", icon, message);
    }
    Ok(())
}
