//! Durable request log for proxied calls.
//!
//! Every call gets a `pending` record before the downstream service is
//! invoked, then exactly one terminal update. Payloads may be sealed with
//! AES-256-GCM.

pub mod cipher;
pub mod error;
pub mod schema;
pub mod store;
pub mod types;

pub use cipher::{EncryptedPayload, EncryptionPolicy, PayloadCipher};
pub use error::{CipherError, RequestLogError};
pub use store::{RequestLogger, SqliteRequestLog, DEFAULT_LIST_LIMIT};
pub use types::{RequestFilter, RequestId, RequestRecord, RequestStatus, RequestUpdate};

pub const REQUESTS_DB_FILENAME: &str = "requests.db";
pub const REQUESTS_TABLE: &str = "requests";
