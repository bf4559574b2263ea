use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::AssetError;

/// Storage address of one asset: `{user}/{request}/{file}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    user_id: String,
    request_id: String,
    file_name: String,
}

fn check_segment(kind: &str, value: &str) -> Result<(), AssetError> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control());
    if invalid {
        return Err(AssetError::InvalidKey(format!("{kind} '{value}' is not a safe path segment")));
    }
    Ok(())
}

impl AssetKey {
    pub fn new(
        user_id: impl Into<String>,
        request_id: impl fmt::Display,
        file_name: impl Into<String>,
    ) -> Result<Self, AssetError> {
        let key = Self {
            user_id: user_id.into(),
            request_id: request_id.to_string(),
            file_name: file_name.into(),
        };
        check_segment("user id", &key.user_id)?;
        check_segment("request id", &key.request_id)?;
        check_segment("file name", &key.file_name)?;
        Ok(key)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Canonical form covered by URL signatures.
    pub fn canonical_path(&self) -> String {
        format!(
            "/{}/{}/{}/{}",
            super::ASSETS_DIR,
            self.user_id,
            self.request_id,
            self.file_name
        )
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.request_id, self.file_name)
    }
}

#[derive(Debug, Clone)]
pub struct StoredAsset {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Blob storage for input and output artifacts.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Writes the asset, replacing any previous content under `key`.
    async fn put(&self, key: &AssetKey, content_type: &str, bytes: Bytes) -> Result<(), AssetError>;

    async fn open(&self, key: &AssetKey) -> Result<StoredAsset, AssetError>;

    fn signed_url(&self, key: &AssetKey, ttl: Duration) -> Result<String, AssetError>;

    fn verify_signature(&self, key: &AssetKey, expires: i64, signature: &str) -> Result<(), AssetError>;

    /// Stores the asset and, when `ttl` is given, issues a signed URL for it.
    /// A failed upload is [`AssetError::Storage`]; a stored asset whose URL
    /// could not be issued is [`AssetError::Sign`].
    async fn store(
        &self,
        key: &AssetKey,
        content_type: &str,
        bytes: Bytes,
        ttl: Option<Duration>,
    ) -> Result<Option<String>, AssetError> {
        self.put(key, content_type, bytes).await?;
        ttl.map(|ttl| self.signed_url(key, ttl)).transpose()
    }
}
