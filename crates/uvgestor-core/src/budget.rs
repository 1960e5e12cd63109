//! Monthly budgets
//!
//! Budgets are local-only. At most one general budget exists per user and
//! month; saving again replaces it (last writer wins).

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{month_year, Budget, NewBudget};
use crate::snapshot::{SnapshotHub, Subscription};

/// (user id, month key)
type BudgetKey = (String, String);

/// Budget operations with live views of the current month's budget
#[derive(Clone)]
pub struct BudgetService {
    db: Database,
    hub: SnapshotHub<BudgetKey, Option<Budget>>,
}

impl BudgetService {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            hub: SnapshotHub::new(),
        }
    }

    /// The general budget for the month containing `today`
    pub fn current_month_budget(&self, user_id: &str, today: NaiveDate) -> Result<Option<Budget>> {
        self.db.get_general_budget(user_id, &month_year(today))
    }

    /// Validate and store a budget, replacing any existing one for the same
    /// month and category
    pub fn save_budget(&self, user_id: &str, budget: NewBudget) -> Result<Budget> {
        budget.validate()?;
        let id = self.db.upsert_budget(user_id, &budget)?;
        let saved = self
            .db
            .get_budget(id)?
            .ok_or_else(|| Error::NotFound(format!("budget {}", id)))?;

        info!(
            month = %saved.month_year,
            limit = saved.limit_amount,
            category = saved.category.as_deref().unwrap_or("general"),
            "Saved budget"
        );
        self.publish(user_id, &saved.month_year);
        Ok(saved)
    }

    /// Set the general limit for the month containing `today`, both alerts on
    pub fn set_monthly_limit(&self, user_id: &str, today: NaiveDate, limit: f64) -> Result<Budget> {
        self.save_budget(user_id, NewBudget::general(today, limit))
    }

    pub fn delete_budget(&self, id: i64) -> Result<bool> {
        let Some(budget) = self.db.get_budget(id)? else {
            return Ok(false);
        };
        let deleted = self.db.delete_budget(id)?;
        self.publish(&budget.user_id, &budget.month_year);
        Ok(deleted)
    }

    pub fn get_budget(&self, id: i64) -> Result<Option<Budget>> {
        self.db.get_budget(id)
    }

    /// All of a user's budgets, most recent month first
    pub fn list_budgets(&self, user_id: &str) -> Result<Vec<Budget>> {
        self.db.list_budgets(user_id)
    }

    pub fn category_budget(
        &self,
        user_id: &str,
        month: &str,
        category: &str,
    ) -> Result<Option<Budget>> {
        self.db.get_category_budget(user_id, month, Some(category))
    }

    pub fn purge_user(&self, user_id: &str) -> Result<usize> {
        let removed = self.db.delete_budgets_for_user(user_id)?;
        let result = self.hub.publish_matching(
            |(user, _)| user == user_id,
            |(user, month)| self.db.get_general_budget(user, month),
        );
        if let Err(e) = result {
            warn!(error = %e, "Failed to refresh budget subscribers");
        }
        Ok(removed)
    }

    /// Live view of the general budget for the month containing `today`
    pub fn subscribe_current(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Subscription<Option<Budget>>> {
        let month = month_year(today);
        self.hub
            .subscribe((user_id.to_string(), month.clone()), || {
                self.db.get_general_budget(user_id, &month)
            })
    }

    fn publish(&self, user_id: &str, month: &str) {
        let key = (user_id.to_string(), month.to_string());
        if let Err(e) = self
            .hub
            .publish(&key, || self.db.get_general_budget(user_id, month))
        {
            warn!(error = %e, "Failed to refresh budget subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> BudgetService {
        BudgetService::new(Database::in_memory().unwrap())
    }

    fn nov(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, d).unwrap()
    }

    #[test]
    fn test_one_general_budget_per_month() {
        let service = setup();

        let first = service.set_monthly_limit("u1", nov(2), 1000.0).unwrap();
        let second = service.set_monthly_limit("u1", nov(20), 1200.0).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.limit_amount, 1200.0);
        assert_eq!(service.list_budgets("u1").unwrap().len(), 1);

        let current = service.current_month_budget("u1", nov(28)).unwrap().unwrap();
        assert_eq!(current.limit_amount, 1200.0);
        assert_eq!(current.month_year, "2025-11");
        assert!(current.category.is_none());
    }

    #[test]
    fn test_save_rejects_non_positive_limit() {
        let service = setup();
        let err = service.set_monthly_limit("u1", nov(2), 0.0).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(service.list_budgets("u1").unwrap().is_empty());
    }

    #[test]
    fn test_category_budget_is_separate_from_general() {
        let service = setup();
        service.set_monthly_limit("u1", nov(1), 1000.0).unwrap();
        service
            .save_budget(
                "u1",
                NewBudget {
                    month_year: "2025-11".to_string(),
                    limit_amount: 300.0,
                    category: Some("Comida".to_string()),
                    alert_at_80_percent: true,
                    alert_at_100_percent: false,
                },
            )
            .unwrap();

        let food = service
            .category_budget("u1", "2025-11", "Comida")
            .unwrap()
            .unwrap();
        assert_eq!(food.limit_amount, 300.0);
        assert!(!food.alert_at_100_percent);

        let general = service.current_month_budget("u1", nov(5)).unwrap().unwrap();
        assert_eq!(general.limit_amount, 1000.0);
        assert_eq!(service.list_budgets("u1").unwrap().len(), 2);
    }

    #[test]
    fn test_no_budget_for_other_month_or_user() {
        let service = setup();
        service.set_monthly_limit("u1", nov(1), 500.0).unwrap();

        let december = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        assert!(service.current_month_budget("u1", december).unwrap().is_none());
        assert!(service.current_month_budget("u2", nov(1)).unwrap().is_none());
    }

    #[test]
    fn test_delete_budget() {
        let service = setup();
        let budget = service.set_monthly_limit("u1", nov(1), 500.0).unwrap();

        assert!(service.delete_budget(budget.id).unwrap());
        assert!(!service.delete_budget(budget.id).unwrap());
        assert!(service.current_month_budget("u1", nov(1)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscribe_current_follows_saves() {
        let service = setup();
        let mut sub = service.subscribe_current("u1", nov(10)).unwrap();
        assert_eq!(sub.next().await, Some(None));

        service.set_monthly_limit("u1", nov(10), 800.0).unwrap();
        let budget = sub.next().await.unwrap().unwrap();
        assert_eq!(budget.limit_amount, 800.0);

        service.delete_budget(budget.id).unwrap();
        assert_eq!(sub.next().await, Some(None));
    }

    #[tokio::test]
    async fn test_purge_clears_open_views_of_that_user_only() {
        let service = setup();
        service.set_monthly_limit("u1", nov(1), 800.0).unwrap();
        service.set_monthly_limit("u2", nov(1), 300.0).unwrap();

        let mut mine = service.subscribe_current("u1", nov(10)).unwrap();
        let theirs = service.subscribe_current("u2", nov(10)).unwrap();
        assert!(mine.next().await.unwrap().is_some());

        assert_eq!(service.purge_user("u1").unwrap(), 1);
        assert_eq!(mine.next().await, Some(None));
        assert_eq!(theirs.current().unwrap().limit_amount, 300.0);
    }
}
