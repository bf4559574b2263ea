use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),
    #[error("payload encryption failed")]
    Encrypt,
    #[error("payload decryption failed")]
    Decrypt,
    #[error("malformed encrypted payload: {0}")]
    Encoding(String),
}

#[derive(Debug, Error)]
pub enum RequestLogError {
    #[error("request {0} not found")]
    NotFound(String),
    #[error("encryption was requested but no encryption key is configured")]
    EncryptionUnavailable,
    #[error("invalid cost: {0}")]
    InvalidCost(String),
    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("request log connection poisoned")]
    Poisoned,
    #[error("request log task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
