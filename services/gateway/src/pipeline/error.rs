use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use request_directory_catalog::{CatalogError, Credits};
use request_directory_ledger::LedgerError;
use request_directory_request_log::{RequestId, RequestLogError};
use serde_json::json;
use thiserror::Error;

use super::{PipelineStage, REQUEST_ID_HEADER};
use crate::assets::AssetError;
use crate::identity::IdentityError;
use crate::transport::TransportError;

pub const GENERIC_ERROR_MESSAGE: &str = "Internal server error.";

#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("downstream request timed out")]
    Timeout,

    #[error("downstream unreachable: {0}")]
    Unreachable(String),

    #[error("downstream returned status {status}")]
    Status { status: u16 },

    #[error("downstream returned an unreadable body: {0}")]
    InvalidBody(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] IdentityError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("payload encryption requested but no encryption key is configured")]
    EncryptionUnavailable,

    #[error("invalid request: {0}")]
    Validation(TransportError),

    #[error("no funds record for user {0}")]
    FundsUnavailable(String),

    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Credits, required: Credits },

    #[error("remote file fetch failed: {0}")]
    Fetch(TransportError),

    #[error("asset persistence failed: {0}")]
    Storage(#[from] AssetError),

    #[error("downstream {api_id} failed: {source}")]
    Downstream {
        api_id: String,
        #[source]
        source: DownstreamError,
    },

    #[error("ledger failure: {0}")]
    Ledger(LedgerError),

    #[error("request log failure: {0}")]
    RequestLog(RequestLogError),
}

impl From<LedgerError> for PipelineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds { balance, required } => {
                PipelineError::InsufficientFunds { balance, required }
            }
            LedgerError::AccountNotFound(user_id) => PipelineError::FundsUnavailable(user_id),
            other => PipelineError::Ledger(other),
        }
    }
}

impl From<RequestLogError> for PipelineError {
    fn from(err: RequestLogError) -> Self {
        match err {
            RequestLogError::EncryptionUnavailable => PipelineError::EncryptionUnavailable,
            other => PipelineError::RequestLog(other),
        }
    }
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Unauthorized(IdentityError::Forbidden(_)) => StatusCode::FORBIDDEN,
            PipelineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PipelineError::Catalog(err) => match err {
                CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
                CatalogError::Disabled(_) | CatalogError::MissingEnv(_) => StatusCode::BAD_REQUEST,
                CatalogError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            PipelineError::EncryptionUnavailable
            | PipelineError::Validation(_)
            | PipelineError::FundsUnavailable(_)
            | PipelineError::InsufficientFunds { .. }
            | PipelineError::Fetch(_)
            | PipelineError::Storage(_)
            | PipelineError::Downstream { .. } => StatusCode::BAD_REQUEST,
            PipelineError::Ledger(_) | PipelineError::RequestLog(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show the caller. Store and downstream detail never
    /// leaves the server.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::Unauthorized(IdentityError::Forbidden(_)) => {
                "This key is not permitted to call this API.".to_string()
            }
            PipelineError::Unauthorized(_) => "Unauthorized".to_string(),
            PipelineError::Catalog(err) => match err {
                CatalogError::NotFound(_) => "This API does not exist.".to_string(),
                CatalogError::Disabled(_) => "This API is not enabled.".to_string(),
                CatalogError::MissingEnv(_) => err.to_string(),
                CatalogError::NotImplemented(_) => "This API is not implemented yet.".to_string(),
                _ => GENERIC_ERROR_MESSAGE.to_string(),
            },
            PipelineError::EncryptionUnavailable => {
                "Encryption was requested but is not configured on this server.".to_string()
            }
            PipelineError::Validation(err) => err.to_string(),
            PipelineError::FundsUnavailable(_) => "Failed to get user funds.".to_string(),
            PipelineError::InsufficientFunds { .. } => "You don't have enough credits.".to_string(),
            PipelineError::Fetch(_) => "Failed to fetch image from URL".to_string(),
            PipelineError::Storage(_) => "Failed to upload image to storage.".to_string(),
            PipelineError::Downstream { api_id, .. } => {
                format!("Failed to get response from {api_id}.")
            }
            PipelineError::Ledger(_) | PipelineError::RequestLog(_) => {
                GENERIC_ERROR_MESSAGE.to_string()
            }
        }
    }
}

/// A failed call: the error, the stage it happened in and the request id
/// when a log entry had been created.
#[derive(Debug)]
pub struct PipelineFailure {
    pub error: PipelineError,
    pub stage: PipelineStage,
    pub request_id: Option<RequestId>,
}

impl PipelineFailure {
    pub fn new(stage: PipelineStage, error: impl Into<PipelineError>) -> Self {
        Self {
            error: error.into(),
            stage,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

impl IntoResponse for PipelineFailure {
    fn into_response(self) -> Response {
        let body = Json(json!({ "message": self.error.public_message() }));
        let mut response = (self.error.status_code(), body).into_response();
        if let Some(request_id) = self.request_id {
            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
        }
        response
    }
}
