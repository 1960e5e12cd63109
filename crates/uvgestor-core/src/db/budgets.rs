//! Budget operations

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{Budget, NewBudget};

const BUDGET_COLUMNS: &str = "id, user_id, month_year, limit_amount, category, alert_at_80_percent, alert_at_100_percent, created_at";

impl Database {
    /// Save a budget, replacing any existing one for the same user, month and category
    pub fn upsert_budget(&self, user_id: &str, budget: &NewBudget) -> Result<i64> {
        budget.validate()?;
        let conn = self.conn()?;

        let id: i64 = conn.query_row(
            r#"
            INSERT INTO budgets (user_id, month_year, limit_amount, category, alert_at_80_percent, alert_at_100_percent)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, month_year, category) DO UPDATE SET
                limit_amount = excluded.limit_amount,
                alert_at_80_percent = excluded.alert_at_80_percent,
                alert_at_100_percent = excluded.alert_at_100_percent,
                updated_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
            params![
                user_id,
                budget.month_year,
                budget.limit_amount,
                budget.category.as_deref().unwrap_or(""),
                budget.alert_at_80_percent,
                budget.alert_at_100_percent,
            ],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    /// The general (all-category) budget for a month
    pub fn get_general_budget(&self, user_id: &str, month_year: &str) -> Result<Option<Budget>> {
        self.get_category_budget(user_id, month_year, None)
    }

    /// The budget for a month and category (`None` = general)
    pub fn get_category_budget(
        &self,
        user_id: &str,
        month_year: &str,
        category: Option<&str>,
    ) -> Result<Option<Budget>> {
        let conn = self.conn()?;
        let budget = conn
            .query_row(
                &format!(
                    "SELECT {} FROM budgets WHERE user_id = ? AND month_year = ? AND category = ?",
                    BUDGET_COLUMNS
                ),
                params![user_id, month_year, category.unwrap_or("")],
                Self::row_to_budget,
            )
            .optional()?;
        Ok(budget)
    }

    pub fn get_budget(&self, id: i64) -> Result<Option<Budget>> {
        let conn = self.conn()?;
        let budget = conn
            .query_row(
                &format!("SELECT {} FROM budgets WHERE id = ?", BUDGET_COLUMNS),
                params![id],
                Self::row_to_budget,
            )
            .optional()?;
        Ok(budget)
    }

    /// All budgets for a user, most recent month first, general before category budgets
    pub fn list_budgets(&self, user_id: &str) -> Result<Vec<Budget>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM budgets WHERE user_id = ? ORDER BY month_year DESC, category",
            BUDGET_COLUMNS
        ))?;

        let budgets = stmt
            .query_map(params![user_id], Self::row_to_budget)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(budgets)
    }

    /// Delete a budget by id; returns whether a row was removed
    pub fn delete_budget(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM budgets WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }

    pub fn delete_budgets_for_user(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM budgets WHERE user_id = ?", params![user_id])?;
        Ok(rows)
    }

    fn row_to_budget(row: &rusqlite::Row) -> rusqlite::Result<Budget> {
        let category: String = row.get(4)?;
        let created_at_str: String = row.get(7)?;
        Ok(Budget {
            id: row.get(0)?,
            user_id: row.get(1)?,
            month_year: row.get(2)?,
            limit_amount: row.get(3)?,
            category: (!category.is_empty()).then_some(category),
            alert_at_80_percent: row.get(5)?,
            alert_at_100_percent: row.get(6)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}
