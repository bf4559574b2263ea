use std::time::Duration;

use bytes::BytesMut;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{FilePayload, TransportError, DEFAULT_FILE_NAME};

/// Downloads caller-referenced files for the `{url}` input shape.
#[derive(Clone)]
pub struct RemoteFetcher {
    client: Client,
    max_bytes: usize,
}

impl RemoteFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Fetch(err.to_string()))?;
        Ok(Self { client, max_bytes })
    }

    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &Url) -> Result<FilePayload, TransportError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| TransportError::Fetch(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "remote file fetch returned non-success status");
            return Err(TransportError::Fetch(format!("remote returned {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(self.too_large(length));
            }
        }

        let mut buffer = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| TransportError::Fetch(err.to_string()))?
        {
            if buffer.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large((buffer.len() + chunk.len()) as u64));
            }
            buffer.extend_from_slice(&chunk);
        }
        let bytes = buffer.freeze();

        let file_name = remote_file_name(url);
        debug!(file_name = %file_name, size = bytes.len(), "fetched remote file");
        Ok(FilePayload::new(bytes, Some(&file_name), content_type.as_deref()))
    }

    fn too_large(&self, size: u64) -> TransportError {
        warn!(size, limit = self.max_bytes, "remote file exceeds size limit");
        TransportError::Fetch(format!(
            "remote file of at least {size} bytes exceeds limit of {} bytes",
            self.max_bytes
        ))
    }
}

/// Last non-empty path segment of `url`.
pub fn remote_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string())
}
