//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `auth` - Account commands (register, login, logout, whoami)
//! - `budget` - Monthly budget commands (set, show, list, delete)
//! - `core` - Init and shared utilities (open_db, load_config, App)
//! - `records` - Expense and income commands (add, list, edit, delete)
//! - `summary` - Totals, balance and budget alert
//! - `sync` - Upload pending records and merge remote ones

pub mod auth;
pub mod budget;
pub mod core;
pub mod records;
pub mod summary;
pub mod sync;

// Re-export command functions for main.rs
pub use auth::*;
pub use budget::*;
pub use core::*;
pub use records::*;
pub use summary::*;
pub use sync::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
