use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::DownstreamError;
use crate::transport::EncodedBody;

/// Request body in the encoding the downstream service expects.
#[derive(Debug, Clone)]
pub enum OutboundBody {
    Multipart(EncodedBody),
    Json(Value),
}

#[derive(Debug, Clone)]
pub struct DownstreamResponse {
    pub body: Value,
    /// Wall-clock time from dispatch until response headers arrived.
    pub latency: Duration,
    pub status: u16,
}

/// HTTP client for proxied inference services. Calls are never retried.
#[derive(Clone)]
pub struct DownstreamClient {
    http_client: Client,
}

impl DownstreamClient {
    pub fn new(timeout: Duration) -> Result<Self, DownstreamError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|err| DownstreamError::Unreachable(err.to_string()))?;

        Ok(Self { http_client })
    }

    #[instrument(skip(self, body), fields(endpoint = %endpoint))]
    pub async fn invoke(
        &self,
        endpoint: &str,
        body: OutboundBody,
    ) -> Result<DownstreamResponse, DownstreamError> {
        let request = match body {
            OutboundBody::Multipart(encoded) => {
                let headers = encoded
                    .headers()
                    .map_err(|err| DownstreamError::Unreachable(err.to_string()))?;
                self.http_client
                    .post(endpoint)
                    .headers(headers)
                    .body(encoded.body)
            }
            OutboundBody::Json(value) => self.http_client.post(endpoint).json(&value),
        };

        let start = Instant::now();
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                DownstreamError::Timeout
            } else {
                DownstreamError::Unreachable(err.to_string())
            }
        })?;
        let latency = start.elapsed();
        let status = response.status();

        info!(
            status = status.as_u16(),
            latency_ms = latency.as_millis() as u64,
            "downstream response received"
        );

        if !status.is_success() {
            return Err(DownstreamError::Status {
                status: status.as_u16(),
            });
        }

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
        {
            if !content_type.to_ascii_lowercase().contains("json") {
                debug!(content_type, "downstream content type is not JSON, parsing anyway");
            }
        }

        let bytes = response.bytes().await.map_err(|err| {
            if err.is_timeout() {
                DownstreamError::Timeout
            } else {
                DownstreamError::InvalidBody(err.to_string())
            }
        })?;
        let body = serde_json::from_slice(&bytes).map_err(|err| {
            warn!(error = %err, "downstream body is not valid JSON");
            DownstreamError::InvalidBody(err.to_string())
        })?;

        Ok(DownstreamResponse {
            body,
            latency,
            status: status.as_u16(),
        })
    }
}
