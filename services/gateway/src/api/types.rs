use request_directory_catalog::{ApiDefinition, Credits};
use request_directory_ledger::LedgerEntry;
use request_directory_request_log::RequestRecord;
use serde::{Deserialize, Serialize};

use crate::pipeline::CallOptions;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Query flags of `POST /v1/:api_id`. Only the literal `true` enables a flag.
#[derive(Debug, Default, Deserialize)]
pub struct CallQuery {
    #[serde(rename = "noSave")]
    pub no_save: Option<String>,
    pub encrypt: Option<String>,
}

impl CallQuery {
    pub fn options(&self) -> CallOptions {
        let flag = |value: &Option<String>| value.as_deref() == Some("true");
        CallOptions {
            no_save: flag(&self.no_save),
            encrypt: flag(&self.encrypt),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiSummary<'a> {
    #[serde(flatten)]
    pub definition: &'a ApiDefinition,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ApiListResponse<'a> {
    pub apis: Vec<ApiSummary<'a>>,
}

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub entries: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub user_id: String,
    pub funds: Credits,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Serialize)]
pub struct RequestListResponse {
    pub requests: Vec<RequestRecord>,
}

#[derive(Debug, Deserialize)]
pub struct AssetQuery {
    pub expires: i64,
    pub signature: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_literal_true_enables_flags() {
        let query = CallQuery {
            no_save: Some("true".into()),
            encrypt: Some("1".into()),
        };
        assert_eq!(
            query.options(),
            CallOptions {
                no_save: true,
                encrypt: false
            }
        );
        assert_eq!(CallQuery::default().options(), CallOptions::default());
    }
}
