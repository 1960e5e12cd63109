//! Aggregation and budget alert engine
//!
//! Pure computation over in-memory records: totals, per-category subtotals,
//! period filtering, budget consumption and the 80%/100% alert decision.
//! Nothing here touches storage.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Budget, Record, TimePeriod, DATE_FORMAT};

/// Percentage at which the early warning fires
pub const WARN_THRESHOLD: u32 = 80;

/// Percentage at which the budget counts as exceeded
pub const EXCEEDED_THRESHOLD: u32 = 100;

/// Sum of all record amounts
pub fn aggregate_totals(records: &[Record]) -> f64 {
    records.iter().map(|r| r.amount).sum()
}

/// Subtotal per category tag
pub fn aggregate_by_category(records: &[Record]) -> BTreeMap<String, f64> {
    let mut by_category = BTreeMap::new();
    for record in records {
        *by_category.entry(record.category.clone()).or_insert(0.0) += record.amount;
    }
    by_category
}

/// Keep the records that fall in the period named by `period_tag`, relative
/// to `reference`
///
/// Only the stored tags (`Diario`, `Semanal`, `Mensual`, `Anual`) filter;
/// any other tag lets every record through. Records with malformed dates
/// are excluded from every period except the catch-all.
pub fn filter_by_period(records: &[Record], period_tag: &str, reference: NaiveDate) -> Vec<Record> {
    let Some(period) = TimePeriod::from_tag(period_tag) else {
        debug!(period = %period_tag, "Unknown period tag, keeping all records");
        return records.to_vec();
    };

    records
        .iter()
        .filter(|record| in_period(record, period, reference))
        .cloned()
        .collect()
}

fn in_period(record: &Record, period: TimePeriod, reference: NaiveDate) -> bool {
    match period {
        TimePeriod::Daily => record.date == reference.format(DATE_FORMAT).to_string(),
        TimePeriod::Weekly => record
            .parsed_date()
            .is_some_and(|date| (0..=7).contains(&(reference - date).num_days())),
        TimePeriod::Monthly => record.parsed_date().is_some_and(|date| {
            date.year() == reference.year() && date.month() == reference.month()
        }),
        TimePeriod::Yearly => record
            .parsed_date()
            .is_some_and(|date| date.year() == reference.year()),
    }
}

/// Share of the budget consumed, floored to a whole percentage
///
/// Returns 0 without a budget or with a non-positive limit.
pub fn compute_budget_percentage(total: f64, budget: Option<&Budget>) -> u32 {
    match budget {
        Some(b) if b.limit_amount > 0.0 => {
            // The epsilon absorbs binary drift in summed amounts (e.g. 79.99999999)
            let raw = total * 100.0 / b.limit_amount;
            (raw + 1e-9).floor().max(0.0) as u32
        }
        _ => 0,
    }
}

/// Alert raised by budget consumption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetAlert {
    None,
    Warn80,
    Exceeded100,
}

impl BudgetAlert {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Warn80 => "warn_80",
            Self::Exceeded100 => "exceeded_100",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// User-facing text for the alert, `None` when nothing fired
    pub fn message(&self, total: f64, budget: &Budget) -> Option<String> {
        match self {
            Self::None => None,
            Self::Warn80 => Some(format!(
                "You have reached {}% of your monthly budget. Keep an eye on your spending.",
                compute_budget_percentage(total, Some(budget))
            )),
            Self::Exceeded100 => Some(format!(
                "You have exceeded your monthly budget! Spent: Q{:.2} / Q{:.2}",
                total, budget.limit_amount
            )),
        }
    }
}

/// Decide which alert fires for `total` against `budget`
///
/// The 100% alert wins over the 80% one, so a single evaluation never emits
/// both. Each threshold only fires when its toggle is on.
pub fn evaluate_alert(total: f64, budget: Option<&Budget>) -> BudgetAlert {
    let Some(b) = budget else {
        return BudgetAlert::None;
    };
    if b.limit_amount <= 0.0 {
        return BudgetAlert::None;
    }

    let percentage = compute_budget_percentage(total, Some(b));
    if percentage >= EXCEEDED_THRESHOLD && b.alert_at_100_percent {
        BudgetAlert::Exceeded100
    } else if percentage >= WARN_THRESHOLD && b.alert_at_80_percent {
        BudgetAlert::Warn80
    } else {
        BudgetAlert::None
    }
}

/// Display-ready statistics for a set of expenses and incomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub total_expenses: f64,
    pub total_incomes: f64,
    /// Incomes minus expenses
    pub balance: f64,
    pub expenses_by_category: BTreeMap<String, f64>,
    pub budget_percentage: u32,
    pub alert: BudgetAlert,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_message: Option<String>,
}

impl FinancialSummary {
    pub fn compute(expenses: &[Record], incomes: &[Record], budget: Option<&Budget>) -> Self {
        let total_expenses = aggregate_totals(expenses);
        let total_incomes = aggregate_totals(incomes);
        let alert = evaluate_alert(total_expenses, budget);
        let alert_message = budget.and_then(|b| alert.message(total_expenses, b));

        Self {
            total_expenses,
            total_incomes,
            balance: total_incomes - total_expenses,
            expenses_by_category: aggregate_by_category(expenses),
            budget_percentage: compute_budget_percentage(total_expenses, budget),
            alert,
            alert_message,
        }
    }

    /// Summary restricted to one period around `reference`
    pub fn for_period(
        expenses: &[Record],
        incomes: &[Record],
        budget: Option<&Budget>,
        period_tag: &str,
        reference: NaiveDate,
    ) -> Self {
        let expenses = filter_by_period(expenses, period_tag, reference);
        let incomes = filter_by_period(incomes, period_tag, reference);
        Self::compute(&expenses, &incomes, budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordKind;
    use chrono::Utc;

    fn record(amount: f64, category: &str, date: &str) -> Record {
        Record {
            id: 0,
            kind: RecordKind::Expense,
            title: format!("{} {}", category, amount),
            amount,
            time_period: TimePeriod::Daily,
            category: category.to_string(),
            date: date.to_string(),
            user_id: "user-1".to_string(),
            synced_with_remote: false,
            remote_id: None,
        }
    }

    fn budget(limit: f64, at_80: bool, at_100: bool) -> Budget {
        Budget {
            id: 1,
            user_id: "user-1".to_string(),
            month_year: "2025-11".to_string(),
            limit_amount: limit,
            category: None,
            alert_at_80_percent: at_80,
            alert_at_100_percent: at_100,
            created_at: Utc::now(),
        }
    }

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 20).unwrap()
    }

    #[test]
    fn test_totals_are_order_independent() {
        let mut records = vec![
            record(55.0, "Comida", "2025-11-19"),
            record(400.0, "Transporte", "2025-11-15"),
            record(60.5, "Ocio", "2025-11-10"),
            record(0.25, "Comida", "2025-11-01"),
        ];
        let forward = aggregate_totals(&records);
        records.reverse();
        let backward = aggregate_totals(&records);
        assert!((forward - backward).abs() < 1e-9);
        assert!((forward - 515.75).abs() < 1e-9);
    }

    #[test]
    fn test_totals_empty() {
        assert_eq!(aggregate_totals(&[]), 0.0);
        assert!(aggregate_by_category(&[]).is_empty());
    }

    #[test]
    fn test_category_subtotals_partition_total() {
        let records = vec![
            record(45.0, "Comida", "2025-11-20"),
            record(30.0, "Transporte", "2025-11-20"),
            record(80.0, "Ocio", "2025-11-18"),
            record(55.0, "Comida", "2025-11-19"),
        ];
        let by_category = aggregate_by_category(&records);
        assert_eq!(by_category.len(), 3);
        assert_eq!(by_category["Comida"], 100.0);
        let sum: f64 = by_category.values().sum();
        assert!((sum - aggregate_totals(&records)).abs() < 1e-9);
    }

    #[test]
    fn test_filter_daily_matches_exact_date() {
        let records = vec![
            record(10.0, "Comida", "2025-11-20"),
            record(20.0, "Comida", "2025-11-19"),
            record(30.0, "Comida", "not-a-date"),
        ];
        let today = filter_by_period(&records, "Diario", reference());
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].amount, 10.0);
    }

    #[test]
    fn test_filter_weekly_boundaries() {
        let records = vec![
            record(1.0, "A", "2025-11-20"), // 0 days
            record(2.0, "A", "2025-11-13"), // exactly 7 days before
            record(3.0, "A", "2025-11-12"), // 8 days before
            record(4.0, "A", "2025-11-21"), // future
            record(5.0, "A", "20/11/2025"), // unparsable
        ];
        let week = filter_by_period(&records, "Semanal", reference());
        let amounts: Vec<f64> = week.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![1.0, 2.0]);
    }

    #[test]
    fn test_filter_monthly_and_yearly() {
        let records = vec![
            record(1.0, "A", "2025-11-01"),
            record(2.0, "A", "2025-10-31"),
            record(3.0, "A", "2024-11-20"),
            record(4.0, "A", "2025-01-05"),
            record(5.0, "A", "garbage"),
        ];
        let month = filter_by_period(&records, "Mensual", reference());
        assert_eq!(month.len(), 1);
        assert_eq!(month[0].amount, 1.0);

        let year = filter_by_period(&records, "Anual", reference());
        let amounts: Vec<f64> = year.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_filter_unknown_tag_keeps_everything() {
        let records = vec![
            record(1.0, "A", "2019-01-01"),
            record(2.0, "A", "garbage"),
        ];
        assert_eq!(filter_by_period(&records, "Todos", reference()).len(), 2);
        assert_eq!(filter_by_period(&records, "", reference()).len(), 2);
    }

    #[test]
    fn test_filter_matches_tags_exactly() {
        let records = vec![
            record(1.0, "A", "2025-11-20"),
            record(2.0, "A", "2019-01-01"),
        ];
        assert_eq!(filter_by_period(&records, "Semanal", reference()).len(), 1);
        // Not stored tags, so nothing is filtered
        for tag in ["weekly", "semanal", " Semanal ", "MENSUAL"] {
            assert_eq!(filter_by_period(&records, tag, reference()).len(), 2, "{tag}");
        }
    }

    #[test]
    fn test_budget_percentage() {
        let b = budget(100.0, true, true);
        assert_eq!(compute_budget_percentage(80.0, Some(&b)), 80);
        assert_eq!(compute_budget_percentage(150.0, Some(&b)), 150);
        assert_eq!(compute_budget_percentage(79.99, Some(&b)), 79);
        assert_eq!(compute_budget_percentage(0.29, Some(&budget(1.0, true, true))), 29);
        assert_eq!(compute_budget_percentage(50.0, None), 0);
        assert_eq!(compute_budget_percentage(50.0, Some(&budget(0.0, true, true))), 0);
    }

    #[test]
    fn test_alert_thresholds_inclusive() {
        let b = budget(100.0, true, true);
        assert_eq!(evaluate_alert(79.0, Some(&b)), BudgetAlert::None);
        assert_eq!(evaluate_alert(80.0, Some(&b)), BudgetAlert::Warn80);
        assert_eq!(evaluate_alert(99.99, Some(&b)), BudgetAlert::Warn80);
        assert_eq!(evaluate_alert(100.0, Some(&b)), BudgetAlert::Exceeded100);
        assert_eq!(evaluate_alert(250.0, Some(&b)), BudgetAlert::Exceeded100);
        assert_eq!(evaluate_alert(250.0, None), BudgetAlert::None);
        assert!(!BudgetAlert::None.is_active());
        assert!(BudgetAlert::Warn80.is_active() && BudgetAlert::Exceeded100.is_active());
    }

    #[test]
    fn test_alert_respects_toggles() {
        // 100% crossed but only the 80% toggle is on: falls through to Warn80
        let only_80 = budget(100.0, true, false);
        assert_eq!(evaluate_alert(120.0, Some(&only_80)), BudgetAlert::Warn80);

        let only_100 = budget(100.0, false, true);
        assert_eq!(evaluate_alert(85.0, Some(&only_100)), BudgetAlert::None);
        assert_eq!(evaluate_alert(100.0, Some(&only_100)), BudgetAlert::Exceeded100);

        let silent = budget(100.0, false, false);
        assert_eq!(evaluate_alert(500.0, Some(&silent)), BudgetAlert::None);
    }

    #[test]
    fn test_scenario_warn_at_85_percent() {
        let b = budget(1000.0, true, true);
        let expenses = vec![
            record(400.0, "Transporte", "2025-11-15"),
            record(450.0, "Comida", "2025-11-16"),
        ];
        let summary = FinancialSummary::compute(&expenses, &[], Some(&b));
        assert_eq!(summary.total_expenses, 850.0);
        assert_eq!(summary.budget_percentage, 85);
        assert_eq!(summary.alert, BudgetAlert::Warn80);
        assert!(summary.alert_message.unwrap().contains("85%"));
    }

    #[test]
    fn test_scenario_exceeded_at_exactly_100_percent() {
        let b = budget(1000.0, true, true);
        let expenses = vec![record(1000.0, "Renta", "2025-11-01")];
        let summary = FinancialSummary::compute(&expenses, &[], Some(&b));
        assert_eq!(summary.budget_percentage, 100);
        assert_eq!(summary.alert, BudgetAlert::Exceeded100);
        assert_eq!(
            summary.alert_message.as_deref(),
            Some("You have exceeded your monthly budget! Spent: Q1000.00 / Q1000.00")
        );
    }

    #[test]
    fn test_summary_balance_and_period() {
        let expenses = vec![
            record(100.0, "Comida", "2025-11-18"),
            record(300.0, "Comida", "2025-09-01"),
        ];
        let mut income = record(1000.0, "Beca", "2025-11-02");
        income.kind = RecordKind::Income;

        let summary =
            FinancialSummary::for_period(&expenses, &[income], None, "Mensual", reference());
        assert_eq!(summary.total_expenses, 100.0);
        assert_eq!(summary.total_incomes, 1000.0);
        assert_eq!(summary.balance, 900.0);
        assert_eq!(summary.budget_percentage, 0);
        assert_eq!(summary.alert, BudgetAlert::None);
        assert!(summary.alert_message.is_none());
    }
}
