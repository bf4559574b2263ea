use std::sync::Arc;

use anyhow::{Context, Result};
use request_directory_catalog::Catalog;
use request_directory_ledger::{Ledger, SqliteLedger};
use request_directory_request_log::{PayloadCipher, RequestLogger, SqliteRequestLog};
use tracing::{info, warn};

pub mod handlers;
pub mod router;
pub mod types;

pub use handlers::*;
pub use router::create_router;
pub use types::*;

use crate::assets::{AssetStore, LocalAssetStore, UrlSigner};
use crate::config::GatewayConfig;
use crate::identity::IdentityExtractor;
use crate::pipeline::{DownstreamClient, EnvLookup, Pipeline};
use crate::transport::RemoteFetcher;

/// Process-wide collaborators, built once at startup and shared by every
/// request.
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub catalog: Arc<Catalog>,
    pub ledger: Arc<dyn Ledger>,
    pub requests: Arc<dyn RequestLogger>,
    pub assets: Arc<dyn AssetStore>,
    pub identity: Arc<IdentityExtractor>,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        Self::with_env(config, Arc::new(|name: &str| std::env::var(name).ok()))
    }

    /// Like [`AppState::new`] with catalog gates and endpoint overrides read
    /// through `env`.
    pub fn with_env(config: GatewayConfig, env: EnvLookup) -> Result<Self> {
        let data_dir = config.data_dir.clone();

        let catalog = Arc::new(Catalog::load(&config.catalog_path).context("Failed to load API catalog")?);

        let ledger: Arc<dyn Ledger> =
            Arc::new(SqliteLedger::new(&data_dir).context("Failed to open ledger")?);

        let cipher = config
            .encryption_key
            .as_deref()
            .map(PayloadCipher::from_hex)
            .transpose()
            .context("Invalid ENCRYPTION_KEY")?;
        if cipher.is_none() {
            warn!(
                policy = %config.unconfigured_encryption,
                "no encryption key configured for logged payloads"
            );
        }
        let requests: Arc<dyn RequestLogger> = Arc::new(
            SqliteRequestLog::new(&data_dir)
                .context("Failed to open request log")?
                .with_cipher(cipher)
                .with_policy(config.unconfigured_encryption),
        );

        let signer = match &config.asset_signing_secret {
            Some(secret) => UrlSigner::new(secret).context("Invalid ASSET_SIGNING_SECRET")?,
            None => {
                warn!("ASSET_SIGNING_SECRET not set, asset links will not survive a restart");
                UrlSigner::generate()
            }
        };
        let assets: Arc<dyn AssetStore> = Arc::new(
            LocalAssetStore::new(&data_dir, &config.asset_base_url, signer)
                .context("Failed to open asset store")?,
        );

        let fetcher = RemoteFetcher::new(config.downstream_timeout(), config.max_body_size_bytes)
            .context("Failed to build remote fetch client")?;
        let downstream = DownstreamClient::new(config.downstream_timeout())
            .context("Failed to build downstream client")?;

        let pipeline = Pipeline::new(
            Arc::clone(&catalog),
            Arc::clone(&ledger),
            Arc::clone(&requests),
            Arc::clone(&assets),
            fetcher,
            downstream,
        )
        .with_env(env)
        .with_asset_ttl(config.asset_url_ttl());

        let identity = Arc::new(IdentityExtractor::new(&config));

        info!(
            apis = catalog.len(),
            enabled = catalog.enabled().count(),
            data_dir = %data_dir.display(),
            "gateway state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            catalog,
            ledger,
            requests,
            assets,
            identity,
            pipeline: Arc::new(pipeline),
        })
    }
}
