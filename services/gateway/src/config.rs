use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use request_directory_request_log::{EncryptionPolicy, PayloadCipher};

use crate::assets::UrlSigner;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen host address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Directory holding the SQLite databases and stored assets
    pub data_dir: PathBuf,

    /// API catalog file
    pub catalog_path: PathBuf,

    /// Timeout for a single downstream call in seconds
    pub downstream_timeout_secs: u64,

    /// Maximum inbound body size in bytes
    pub max_body_size_bytes: usize,

    /// HS256 secret of the identity token minted by the key-verification middleware
    pub identity_jwt_secret: Option<String>,

    /// Accept `X-User-Id` from a trusted front proxy
    pub trust_identity_header: bool,

    /// 64 hex character AES-256 key for logged payloads
    pub encryption_key: Option<String>,

    /// Behaviour of `encrypt=true` when no key is configured
    pub unconfigured_encryption: EncryptionPolicy,

    /// Public base URL used in signed asset links
    pub asset_base_url: String,

    /// HMAC secret for asset links, generated per process when absent
    pub asset_signing_secret: Option<String>,

    /// Lifetime of signed asset links in seconds
    pub asset_url_ttl_secs: u64,

    /// Log level
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            data_dir: PathBuf::from("data/gateway"),
            catalog_path: PathBuf::from(request_directory_catalog::DEFAULT_CATALOG_FILENAME),
            downstream_timeout_secs: 30,
            max_body_size_bytes: 10 * 1024 * 1024,
            identity_jwt_secret: None,
            trust_identity_header: false,
            encryption_key: None,
            unconfigured_encryption: EncryptionPolicy::Reject,
            asset_base_url: "http://localhost:8080".to_string(),
            asset_signing_secret: None,
            asset_url_ttl_secs: 86_400,
            log_level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let host = std::env::var("GATEWAY_HOST").unwrap_or(defaults.host);
        let port = std::env::var("GATEWAY_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("Invalid GATEWAY_PORT")?;

        let data_dir = std::env::var("GATEWAY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let catalog_path = std::env::var("CATALOG_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.catalog_path);

        let downstream_timeout_secs = std::env::var("DOWNSTREAM_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("Invalid DOWNSTREAM_TIMEOUT_SECS")?;

        let max_body_size_bytes = std::env::var("MAX_BODY_SIZE_BYTES")
            .unwrap_or_else(|_| "10485760".to_string()) // 10MB
            .parse()
            .context("Invalid MAX_BODY_SIZE_BYTES")?;

        let identity_jwt_secret = non_empty_var("IDENTITY_JWT_SECRET");

        let trust_identity_header = std::env::var("TRUST_IDENTITY_HEADER")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .context("Invalid TRUST_IDENTITY_HEADER")?;

        let encryption_key = non_empty_var("ENCRYPTION_KEY");

        let unconfigured_encryption = std::env::var("UNCONFIGURED_ENCRYPTION")
            .unwrap_or_else(|_| "reject".to_string())
            .parse::<EncryptionPolicy>()
            .map_err(anyhow::Error::msg)
            .context("Invalid UNCONFIGURED_ENCRYPTION")?;

        let asset_base_url =
            std::env::var("ASSET_BASE_URL").unwrap_or(defaults.asset_base_url);

        let asset_signing_secret = non_empty_var("ASSET_SIGNING_SECRET");

        let asset_url_ttl_secs = std::env::var("ASSET_URL_TTL_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .context("Invalid ASSET_URL_TTL_SECS")?;

        let log_level = std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level);

        Ok(Self {
            host,
            port,
            data_dir,
            catalog_path,
            downstream_timeout_secs,
            max_body_size_bytes,
            identity_jwt_secret,
            trust_identity_header,
            encryption_key,
            unconfigured_encryption,
            asset_base_url,
            asset_signing_secret,
            asset_url_ttl_secs,
            log_level,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.identity_jwt_secret.is_none() && !self.trust_identity_header {
            anyhow::bail!(
                "IDENTITY_JWT_SECRET is required unless TRUST_IDENTITY_HEADER is true"
            );
        }

        if let Some(key) = &self.encryption_key {
            PayloadCipher::from_hex(key).context("Invalid ENCRYPTION_KEY")?;
        }

        let base = url::Url::parse(&self.asset_base_url).context("Invalid ASSET_BASE_URL")?;
        if !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("ASSET_BASE_URL must be an http(s) URL");
        }

        if let Some(secret) = &self.asset_signing_secret {
            UrlSigner::new(secret).context("Invalid ASSET_SIGNING_SECRET")?;
        }

        if self.downstream_timeout_secs == 0 {
            anyhow::bail!("DOWNSTREAM_TIMEOUT_SECS must be greater than 0");
        }

        if self.max_body_size_bytes == 0 {
            anyhow::bail!("MAX_BODY_SIZE_BYTES must be greater than 0");
        }

        if self.asset_url_ttl_secs == 0 {
            anyhow::bail!("ASSET_URL_TTL_SECS must be greater than 0");
        }

        Ok(())
    }

    pub fn downstream_timeout(&self) -> Duration {
        Duration::from_secs(self.downstream_timeout_secs)
    }

    pub fn asset_url_ttl(&self) -> Duration {
        Duration::from_secs(self.asset_url_ttl_secs)
    }

    /// Get the listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
