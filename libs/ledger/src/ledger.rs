use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use request_directory_catalog::Credits;
use serde::Serialize;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Open,
    Credit,
    Reserve,
    Reconcile,
    Refund,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Open => "open",
            EntryKind::Credit => "credit",
            EntryKind::Reserve => "reserve",
            EntryKind::Reconcile => "reconcile",
            EntryKind::Refund => "refund",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(EntryKind::Open),
            "credit" => Ok(EntryKind::Credit),
            "reserve" => Ok(EntryKind::Reserve),
            "reconcile" => Ok(EntryKind::Reconcile),
            "refund" => Ok(EntryKind::Refund),
            other => Err(LedgerError::InvalidAmount(format!(
                "unknown ledger entry kind {other}"
            ))),
        }
    }
}

/// One journaled balance mutation. `amount` is the signed change applied to
/// the balance.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub user_id: String,
    pub kind: EntryKind,
    pub amount: Credits,
    pub balance_after: Credits,
    pub created_at: String,
}

/// Prepaid balance store.
///
/// Every mutation is atomic against the persisted balance and returns the
/// balance after the change.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn balance(&self, user_id: &str) -> Result<Credits, LedgerError>;

    /// Debits `amount` only if the balance covers it.
    async fn reserve(&self, user_id: &str, amount: Credits) -> Result<Credits, LedgerError>;

    /// Settles a reservation so the net charge equals `actual`. May leave the
    /// balance negative when `actual` exceeds what was reserved.
    async fn reconcile(
        &self,
        user_id: &str,
        actual: Credits,
        reserved: Credits,
    ) -> Result<Credits, LedgerError>;

    async fn refund(&self, user_id: &str, amount: Credits) -> Result<Credits, LedgerError>;

    /// Top-up entry point for the payment flow. No proxy path calls it.
    async fn credit(&self, user_id: &str, amount: Credits) -> Result<Credits, LedgerError>;

    /// Creates the account with `initial` funds. Existing accounts are left
    /// untouched and their current balance is returned.
    async fn open_account(&self, user_id: &str, initial: Credits) -> Result<Credits, LedgerError>;

    /// Most recent journal entries first.
    async fn entries(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>, LedgerError>;
}
