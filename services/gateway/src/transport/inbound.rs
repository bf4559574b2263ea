use bytes::Bytes;
use serde_json::Value;
use url::Url;

use super::{parse_multipart_form, FilePayload, TransportError};

/// Multipart field carrying the caller's upload.
pub const IMAGE_FIELD: &str = "image";
/// JSON field naming a remote file to fetch.
pub const URL_FIELD: &str = "url";

/// Validated inbound body, before any remote fetch.
#[derive(Debug, Clone)]
pub enum InboundPayload {
    /// JSON body naming a file to download; `request` is the body as sent.
    RemoteUrl { url: Url, request: Value },
    /// Multipart upload of the `image` field.
    Upload(FilePayload),
    /// Opaque JSON forwarded unchanged to JSON APIs.
    Json(Value),
}

impl InboundPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundPayload::RemoteUrl { .. } => "url",
            InboundPayload::Upload(_) => "form-data",
            InboundPayload::Json(_) => "json",
        }
    }
}

fn is_json(content_type: &str) -> bool {
    content_type
        .to_ascii_lowercase()
        .contains("application/json")
}

fn is_multipart(content_type: &str) -> bool {
    content_type
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
}

fn parse_json(body: &Bytes) -> Result<Value, TransportError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body).map_err(|err| TransportError::InvalidJson(err.to_string()))
}

/// Validates an inbound body against what the target API accepts.
///
/// File APIs take either a JSON `{url}` or a multipart `image` upload; an
/// empty upload counts as missing. JSON APIs take any JSON document.
pub fn parse_inbound(
    content_type: Option<&str>,
    body: &Bytes,
    accepts_file: bool,
) -> Result<InboundPayload, TransportError> {
    let content_type = content_type.unwrap_or_default();

    if !accepts_file {
        if !content_type.is_empty() && !is_json(content_type) {
            return Err(TransportError::UnsupportedContentType(
                content_type.to_string(),
            ));
        }
        return parse_json(body).map(InboundPayload::Json);
    }

    if is_json(content_type) {
        let request = parse_json(body)?;
        let raw_url = request
            .get(URL_FIELD)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(TransportError::MissingUrl)?;

        let url = Url::parse(raw_url).map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }
        return Ok(InboundPayload::RemoteUrl { url, request });
    }

    if is_multipart(content_type) {
        return parse_multipart_form(content_type, body)?
            .into_iter()
            .find(|part| part.name == IMAGE_FIELD && !part.data.is_empty())
            .map(|part| InboundPayload::Upload(part.into_file()))
            .ok_or(TransportError::MissingImage);
    }

    if body.is_empty() {
        return Err(TransportError::MissingImage);
    }

    Err(TransportError::UnsupportedContentType(if content_type.is_empty() {
        "none".to_string()
    } else {
        content_type.to_string()
    }))
}
