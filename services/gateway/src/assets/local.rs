use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::fs;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::{AssetError, AssetKey, AssetStore, StoredAsset, UrlSigner, ASSETS_DIR};
use crate::transport::DEFAULT_CONTENT_TYPE;

/// Filesystem asset store rooted at `<data_dir>/assets`. Links point back at
/// the gateway's own `/assets` route.
pub struct LocalAssetStore {
    root: PathBuf,
    base_url: Url,
    signer: UrlSigner,
}

impl LocalAssetStore {
    pub fn new(
        data_dir: impl AsRef<Path>,
        base_url: &str,
        signer: UrlSigner,
    ) -> Result<Self, AssetError> {
        let root = data_dir.as_ref().join(ASSETS_DIR);
        std::fs::create_dir_all(&root).map_err(|err| AssetError::Storage(err.to_string()))?;
        let base_url =
            Url::parse(base_url).map_err(|err| AssetError::Sign(format!("invalid base URL: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AssetError::Sign(format!("{base_url} cannot be a base URL")));
        }

        info!(root = %root.display(), base_url = %base_url, "asset store ready");
        Ok(Self {
            root,
            base_url,
            signer,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &AssetKey) -> PathBuf {
        self.root
            .join(key.user_id())
            .join(key.request_id())
            .join(key.file_name())
    }

    fn content_type_path(&self, key: &AssetKey) -> PathBuf {
        self.root
            .join(key.user_id())
            .join(key.request_id())
            .join(format!(".{}.content-type", key.file_name()))
    }
}

async fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_file_name(format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        Uuid::new_v4()
    ));
    fs::write(&tmp, contents).await?;
    if let Err(err) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(err);
    }
    Ok(())
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn put(&self, key: &AssetKey, content_type: &str, bytes: Bytes) -> Result<(), AssetError> {
        let path = self.path_for(key);
        let storage = |err: std::io::Error| AssetError::Storage(format!("{key}: {err}"));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(storage)?;
        }
        write_atomically(&path, &bytes).await.map_err(storage)?;
        write_atomically(&self.content_type_path(key), content_type.as_bytes())
            .await
            .map_err(storage)?;

        debug!(asset = %key, size = bytes.len(), content_type, "stored asset");
        Ok(())
    }

    async fn open(&self, key: &AssetKey) -> Result<StoredAsset, AssetError> {
        let bytes = match fs::read(self.path_for(key)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(AssetError::NotFound(key.to_string()))
            }
            Err(err) => return Err(AssetError::Storage(format!("{key}: {err}"))),
        };

        let content_type = fs::read_to_string(self.content_type_path(key))
            .await
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        Ok(StoredAsset {
            bytes: Bytes::from(bytes),
            content_type,
        })
    }

    fn signed_url(&self, key: &AssetKey, ttl: Duration) -> Result<String, AssetError> {
        let ttl = i64::try_from(ttl.as_secs())
            .map_err(|_| AssetError::Sign("ttl out of range".into()))?;
        let expires = Utc::now().timestamp() + ttl;
        let signature = self.signer.sign(&key.canonical_path(), expires)?;

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AssetError::Sign("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend([ASSETS_DIR, key.user_id(), key.request_id(), key.file_name()]);
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);

        Ok(url.to_string())
    }

    fn verify_signature(&self, key: &AssetKey, expires: i64, signature: &str) -> Result<(), AssetError> {
        self.signer
            .verify(&key.canonical_path(), expires, signature, Utc::now().timestamp())
    }
}
