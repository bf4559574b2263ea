use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("You haven't provided a URL. The `url` field is required.")]
    MissingUrl,

    #[error("You haven't provided an image. The `image` field is required.")]
    MissingImage,

    #[error("The `url` field must be an absolute http(s) URL: {0}")]
    InvalidUrl(String),

    #[error("Request body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Malformed multipart body: {0}")]
    InvalidMultipart(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Remote fetch failed: {0}")]
    Fetch(String),

    #[error("Invalid outbound header: {0}")]
    Header(String),
}
