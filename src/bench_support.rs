use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use rand::Rng;
use request_directory_catalog::Credits;
use request_directory_gateway::api::AppState;
use request_directory_gateway::config::GatewayConfig;
use request_directory_gateway::pipeline::{EnvLookup, REQUEST_ID_HEADER};
use request_directory_gateway::server::GatewayServer;
use request_directory_gateway::transport::{encode_multipart, FilePayload, IMAGE_FIELD};
use request_directory_ledger::LedgerEntry;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const USER_HEADER: &str = "X-User-Id";
pub const ASSET_SIGNING_SECRET: &str = "e2e-asset-signing-secret-0123456789";

/// Catalog used by the e2e suite. Both APIs forward multipart uploads to
/// `{downstream}/infer`; `nudenet-fixed` bills a flat price instead of
/// latency.
pub fn e2e_catalog(downstream: &str) -> String {
    format!(
        r#"
[apis]
enabled = true

[api.nudenet]
name = "NudeNet"
one_liner = "Detects nudity in images."
url = "{downstream}/infer"

[api.nudenet.request]
type = "form-data"
field = "file"

[api.nudenet.pricing]
estimated = 0.0001

[[api.nudenet.inputs]]
id = "image"
type = "image"
required = true

[[api.nudenet.outputs]]
id = "censored_image"
type = "image"

[api.nudenet-fixed]
name = "NudeNet (flat rate)"
url = "{downstream}/infer"

[api.nudenet-fixed.request]
type = "form-data"
field = "file"

[api.nudenet-fixed.pricing]
estimated = 0.0001
price = 0.000005

[[api.nudenet-fixed.inputs]]
id = "image"
type = "image"
required = true
"#
    )
}

pub fn random_user_id(prefix: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{prefix}-{suffix:08x}")
}

/// Installs a test subscriber once; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Reply of one gateway call, read eagerly so assertions stay synchronous.
#[derive(Debug)]
pub struct CallReply {
    pub status: StatusCode,
    pub request_id: Option<String>,
    pub body: Value,
}

/// In-process gateway bound to an ephemeral port, with its own scratch
/// data directory.
pub struct GatewayHarness {
    base_url: String,
    state: Arc<AppState>,
    client: Client,
    temp_dir: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl GatewayHarness {
    pub async fn start(catalog_toml: &str) -> Result<Self> {
        Self::start_with(catalog_toml, |_| {}).await
    }

    pub async fn start_with(
        catalog_toml: &str,
        tweak: impl FnOnce(&mut GatewayConfig),
    ) -> Result<Self> {
        let temp_dir = TempDir::new().context("creating harness tempdir")?;
        let catalog_path = temp_dir.path().join("catalog.toml");
        tokio::fs::write(&catalog_path, catalog_toml)
            .await
            .context("writing harness catalog")?;

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("binding ephemeral port")?;
        let addr = listener.local_addr()?;
        let base_url = format!("http://{addr}");

        let mut config = GatewayConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            data_dir: temp_dir.path().join("data"),
            catalog_path,
            downstream_timeout_secs: 5,
            trust_identity_header: true,
            asset_base_url: base_url.clone(),
            asset_signing_secret: Some(ASSET_SIGNING_SECRET.to_string()),
            log_level: "warn".to_string(),
            ..GatewayConfig::default()
        };
        tweak(&mut config);
        config.validate()?;

        let env: EnvLookup = Arc::new(|_: &str| -> Option<String> { None });
        let server = GatewayServer::from_state(AppState::with_env(config, env)?);
        let state = server.state();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        info!(%base_url, "harness gateway started");
        Ok(Self {
            base_url,
            state,
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            temp_dir,
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn data_dir(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("data")
    }

    pub async fn open_account(&self, user_id: &str, amount: Credits) -> Result<Credits> {
        Ok(self.state.ledger.open_account(user_id, amount).await?)
    }

    pub async fn balance(&self, user_id: &str) -> Result<Credits> {
        Ok(self.state.ledger.balance(user_id).await?)
    }

    pub async fn ledger_entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>> {
        Ok(self.state.ledger.entries(user_id, 100).await?)
    }

    /// Posts `image` as the multipart `image` field of `POST /v1/{api_id}`.
    pub async fn upload(
        &self,
        user_id: &str,
        api_id: &str,
        image: Bytes,
        file_name: &str,
    ) -> Result<CallReply> {
        let file = FilePayload::new(image, Some(file_name), Some("image/png"));
        let encoded = encode_multipart(&file, IMAGE_FIELD);
        let response = self
            .client
            .post(self.url(&format!("/v1/{api_id}")))
            .header(USER_HEADER, user_id)
            .headers(encoded.headers()?)
            .body(encoded.body)
            .send()
            .await?;
        Self::read_reply(response).await
    }

    pub async fn post_json(&self, user_id: &str, api_id: &str, body: &Value) -> Result<CallReply> {
        let response = self
            .client
            .post(self.url(&format!("/v1/{api_id}")))
            .header(USER_HEADER, user_id)
            .json(body)
            .send()
            .await?;
        Self::read_reply(response).await
    }

    pub async fn get(&self, user_id: &str, path: &str) -> Result<CallReply> {
        let response = self
            .client
            .get(self.url(path))
            .header(USER_HEADER, user_id)
            .send()
            .await?;
        Self::read_reply(response).await
    }

    async fn read_reply(response: reqwest::Response) -> Result<CallReply> {
        let status = response.status();
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).context("gateway reply is not JSON")?
        };
        debug!(%status, ?request_id, "gateway reply");
        Ok(CallReply {
            status,
            request_id,
            body,
        })
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .context("gateway did not stop in time")??
                .context("gateway exited with an error")?;
        }
        Ok(())
    }
}

impl Drop for GatewayHarness {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
