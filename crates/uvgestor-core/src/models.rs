//! Domain models for UVGestor

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Date format used for record dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format used for budget month keys
pub const MONTH_YEAR_FORMAT: &str = "%Y-%m";

/// Which kind of money movement a record is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Expense,
    Income,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
        }
    }

    /// Remote collection holding documents of this kind
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Expense => "expenses",
            Self::Income => "incomes",
        }
    }

    pub fn all() -> &'static [RecordKind] {
        &[Self::Expense, Self::Income]
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expense" | "expenses" | "gasto" => Ok(Self::Expense),
            "income" | "incomes" | "ingreso" => Ok(Self::Income),
            _ => Err(format!("Unknown record kind: {}", s)),
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User-facing grouping label attached to a record
///
/// Stored with the Spanish tags the mobile app shows. This is a label only;
/// nothing is scheduled from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimePeriod {
    #[serde(rename = "Diario")]
    Daily,
    #[serde(rename = "Semanal")]
    Weekly,
    #[serde(rename = "Mensual")]
    Monthly,
    #[serde(rename = "Anual")]
    Yearly,
}

impl TimePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "Diario",
            Self::Weekly => "Semanal",
            Self::Monthly => "Mensual",
            Self::Yearly => "Anual",
        }
    }

    pub fn all() -> &'static [TimePeriod] {
        &[Self::Daily, Self::Weekly, Self::Monthly, Self::Yearly]
    }

    /// Exact match on the stored tag (`"Diario"`, `"Semanal"`, ...)
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::all().iter().copied().find(|p| p.as_str() == tag)
    }
}

impl std::str::FromStr for TimePeriod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "diario" | "daily" => Ok(Self::Daily),
            "semanal" | "weekly" => Ok(Self::Weekly),
            "mensual" | "monthly" => Ok(Self::Monthly),
            "anual" | "yearly" | "annual" => Ok(Self::Yearly),
            _ => Err(format!("Unknown time period: {}", s)),
        }
    }
}

impl std::fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An expense or income entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Local identifier, assigned by the store on insert (0 before insert)
    pub id: i64,
    pub kind: RecordKind,
    pub title: String,
    pub amount: f64,
    pub time_period: TimePeriod,
    pub category: String,
    /// `YYYY-MM-DD`; may be malformed for records pulled from the remote store
    pub date: String,
    pub user_id: String,
    pub synced_with_remote: bool,
    /// Identifier assigned by the remote store after a successful upstream write
    pub remote_id: Option<String>,
}

impl Record {
    /// Parsed record date, `None` when the stored string is malformed
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, DATE_FORMAT).ok()
    }
}

/// A record as submitted by the user, before the store assigns an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub title: String,
    pub amount: f64,
    pub time_period: TimePeriod,
    pub category: String,
    pub date: String,
}

impl NewRecord {
    /// Create a record dated on the given day
    pub fn new(
        title: impl Into<String>,
        amount: f64,
        time_period: TimePeriod,
        category: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            title: title.into(),
            amount,
            time_period,
            category: category.into(),
            date: date.format(DATE_FORMAT).to_string(),
        }
    }

    /// Check the record invariants: non-blank title and a positive amount
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("Title cannot be empty".to_string()));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(Error::Validation(
                "Amount must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// A monthly spending limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub user_id: String,
    /// `YYYY-MM`
    pub month_year: String,
    pub limit_amount: f64,
    /// None = applies to all categories
    pub category: Option<String>,
    pub alert_at_80_percent: bool,
    pub alert_at_100_percent: bool,
    pub created_at: DateTime<Utc>,
}

/// A budget to be saved (upserted on user + month + category)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBudget {
    pub month_year: String,
    pub limit_amount: f64,
    pub category: Option<String>,
    pub alert_at_80_percent: bool,
    pub alert_at_100_percent: bool,
}

impl NewBudget {
    /// A general budget for the month containing `date`, with both alerts on
    pub fn general(date: NaiveDate, limit_amount: f64) -> Self {
        Self {
            month_year: month_year(date),
            limit_amount,
            category: None,
            alert_at_80_percent: true,
            alert_at_100_percent: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.limit_amount.is_finite() || self.limit_amount <= 0.0 {
            return Err(Error::Validation(
                "Budget limit must be greater than 0".to_string(),
            ));
        }
        if NaiveDate::parse_from_str(&format!("{}-01", self.month_year), DATE_FORMAT).is_err() {
            return Err(Error::Validation(format!(
                "Invalid month (expected YYYY-MM): {}",
                self.month_year
            )));
        }
        Ok(())
    }
}

/// Month key (`YYYY-MM`) for a date
pub fn month_year(date: NaiveDate) -> String {
    date.format(MONTH_YEAR_FORMAT).to_string()
}

/// A guardian linked to a minor at registration time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guardian {
    pub name: String,
    pub email: String,
    /// e.g. "Padre", "Madre", "Tutor"
    pub relationship: String,
    pub has_access_to_finances: bool,
}

/// A registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub guardians: Vec<Guardian>,
    pub is_minor: bool,
}

/// The signed-in user, owned by the top-level caller and passed into
/// user-scoped operations
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: User,
}

impl Session {
    pub fn new(user: User) -> Self {
        Self { user }
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_period_parse_spanish_and_english() {
        assert_eq!("Semanal".parse::<TimePeriod>().unwrap(), TimePeriod::Weekly);
        assert_eq!("monthly".parse::<TimePeriod>().unwrap(), TimePeriod::Monthly);
        assert_eq!(" anual ".parse::<TimePeriod>().unwrap(), TimePeriod::Yearly);
        assert!("Quincenal".parse::<TimePeriod>().is_err());
    }

    #[test]
    fn test_time_period_serializes_as_tag() {
        let json = serde_json::to_string(&TimePeriod::Daily).unwrap();
        assert_eq!(json, "\"Diario\"");
    }

    #[test]
    fn test_new_record_validation() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        let ok = NewRecord::new("Almuerzo", 55.0, TimePeriod::Daily, "Comida", date);
        assert!(ok.validate().is_ok());
        assert_eq!(ok.date, "2025-11-03");

        let blank = NewRecord::new("   ", 55.0, TimePeriod::Daily, "Comida", date);
        assert!(matches!(blank.validate(), Err(Error::Validation(_))));

        let zero = NewRecord::new("Cafe", 0.0, TimePeriod::Daily, "Comida", date);
        assert!(matches!(zero.validate(), Err(Error::Validation(_))));

        let nan = NewRecord::new("Cafe", f64::NAN, TimePeriod::Daily, "Comida", date);
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_new_budget_validation() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 15).unwrap();
        let budget = NewBudget::general(date, 1000.0);
        assert_eq!(budget.month_year, "2025-11");
        assert!(budget.validate().is_ok());

        assert!(NewBudget::general(date, -5.0).validate().is_err());

        let mut bad_month = NewBudget::general(date, 10.0);
        bad_month.month_year = "2025-13".to_string();
        assert!(bad_month.validate().is_err());
    }
}
