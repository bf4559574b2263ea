use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset storage failed: {0}")]
    Storage(String),

    #[error("signed URL issuance failed: {0}")]
    Sign(String),

    #[error("invalid asset key: {0}")]
    InvalidKey(String),

    #[error("invalid signing key: {0}")]
    SigningKey(String),

    #[error("signature mismatch")]
    InvalidSignature,

    #[error("signed URL expired")]
    Expired,

    #[error("asset not found: {0}")]
    NotFound(String),
}
