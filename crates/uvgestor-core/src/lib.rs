//! UVGestor Core Library
//!
//! Shared functionality for the UVGestor student finance tracker:
//! - Domain models (records, budgets, users, guardians)
//! - Aggregation and budget alert engine
//! - Local store with connection pooling and migrations
//! - Pluggable remote document stores (HTTP, mock, offline)
//! - Local-first sync policy for expenses and incomes
//! - Monthly budgets with threshold alerts
//! - Authentication with local session fallback
//! - Snapshot subscriptions for reactive consumers

pub mod auth;
pub mod budget;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod snapshot;
pub mod stats;
pub mod sync;

/// Test utilities including a mock remote document server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use auth::{AuthService, GuardianInput, Identity, IdentityClient, IdentityProvider};
pub use budget::BudgetService;
pub use config::AppConfig;
pub use db::Database;
pub use error::{Error, Result};
pub use models::{Budget, Guardian, NewBudget, NewRecord, Record, RecordKind, Session, TimePeriod, User};
pub use remote::{RemoteClient, RemoteRecord, RemoteStore};
pub use snapshot::{SnapshotHub, Subscription};
pub use stats::{BudgetAlert, FinancialSummary};
pub use sync::{RecordRepository, Snapshot, SnapshotSource, SweepReport};
