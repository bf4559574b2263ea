//! Prepaid balance ledger.
//!
//! Balances are stored as integer counts of `10^-10` credits so every debit
//! and credit is a single exact SQL statement. Each mutation is journaled in
//! `ledger_entries` within the same transaction.

pub mod error;
pub mod ledger;
pub mod schema;
pub mod sqlite;

pub use error::LedgerError;
pub use ledger::{EntryKind, Ledger, LedgerEntry};
pub use sqlite::SqliteLedger;

pub const LEDGER_DB_FILENAME: &str = "ledger.db";
pub const USERS_TABLE: &str = "users";
pub const LEDGER_ENTRIES_TABLE: &str = "ledger_entries";
