use std::fmt;
use std::str::FromStr;

use request_directory_catalog::Credits;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type RequestId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Success,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Success => "success",
            RequestStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "success" => Ok(RequestStatus::Success),
            "failed" => Ok(RequestStatus::Failed),
            other => Err(format!("unknown request status {other}")),
        }
    }
}

/// One proxied call as exposed to its owner. Payloads are already decrypted.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub id: RequestId,
    pub user_id: String,
    pub service: String,
    pub status: RequestStatus,
    pub request: Option<Value>,
    pub response: Option<Value>,
    pub cost: Credits,
    pub encrypted: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Partial update merged into an existing record. `None` fields keep their
/// stored value.
#[derive(Debug, Clone)]
pub struct RequestUpdate {
    pub status: RequestStatus,
    pub request: Option<Value>,
    pub response: Option<Value>,
    pub cost: Option<Credits>,
    pub encrypt: bool,
}

impl RequestUpdate {
    pub fn status(status: RequestStatus) -> Self {
        Self {
            status,
            request: None,
            response: None,
            cost: None,
            encrypt: false,
        }
    }

    pub fn with_request(mut self, request: Value) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_cost(mut self, cost: Credits) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn encrypted(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RequestFilter {
    pub service: Option<String>,
    pub status: Option<RequestStatus>,
    pub limit: Option<usize>,
}
