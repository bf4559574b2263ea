use bytes::Bytes;

pub const DEFAULT_FILE_NAME: &str = "image";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const MAX_FILE_NAME_LEN: usize = 128;

/// Canonical binary input: bytes plus the name and type they arrived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub bytes: Bytes,
    pub file_name: String,
    pub content_type: String,
}

impl FilePayload {
    pub fn new(bytes: impl Into<Bytes>, file_name: Option<&str>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: sanitize_file_name(file_name.unwrap_or(DEFAULT_FILE_NAME)),
            content_type: content_type
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Reduces a client supplied name to a single safe path segment.
pub fn sanitize_file_name(raw: &str) -> String {
    let last = raw
        .rsplit(|c: char| c == '/' || c == '\\')
        .find(|segment| !segment.trim().is_empty())
        .unwrap_or("");

    let cleaned: String = last
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_LEN)
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        DEFAULT_FILE_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}
