use std::io;

use request_directory_catalog::Credits;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient funds: balance={balance}, required={required}")]
    InsufficientFunds { balance: Credits, required: Credits },
    #[error("account {0} not found")]
    AccountNotFound(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("ledger connection poisoned")]
    Poisoned,
    #[error("ledger task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
