use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use request_directory_catalog::{Catalog, Credits, Estimate, ResolvedApi};
use request_directory_ledger::Ledger;
use request_directory_request_log::{RequestId, RequestLogger, RequestStatus, RequestUpdate};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{error, info, instrument, warn};

use super::{
    DownstreamClient, OutboundBody, PipelineError, PipelineFailure, PipelineStage,
    OUTPUT_IMAGE_CONTENT_TYPE,
};
use crate::assets::{AssetKey, AssetStore};
use crate::identity::{AuthenticatedIdentity, IdentityError};
use crate::transport::{encode_multipart, parse_inbound, FilePayload, InboundPayload, RemoteFetcher};

/// Environment lookup used for catalog gates and endpoint overrides.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Skip persisting the caller's input file.
    pub no_save: bool,
    /// Encrypt logged request and response payloads.
    pub encrypt: bool,
}

/// One inbound call to `POST /v1/:api_id`.
#[derive(Debug, Clone)]
pub struct ProxyCall {
    pub api_id: String,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub options: CallOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FundsSummary {
    pub remaining: Credits,
    pub actual: Credits,
}

#[derive(Debug, Clone)]
pub struct ProxyOutcome {
    pub request_id: RequestId,
    /// Downstream result with asset URLs substituted and `funds` attached.
    pub body: Value,
    pub funds: FundsSummary,
    pub latency: Duration,
}

/// Failure after funds were reserved, with the amount still held.
struct HeldFailure {
    stage: PipelineStage,
    error: PipelineError,
    held: Credits,
}

/// Per-call values threaded through the reserved section.
struct CallContext<'a> {
    user_id: &'a str,
    api: &'a ResolvedApi,
    estimate: Estimate,
    request_id: RequestId,
    options: CallOptions,
}

pub struct Pipeline {
    catalog: Arc<Catalog>,
    ledger: Arc<dyn Ledger>,
    requests: Arc<dyn RequestLogger>,
    assets: Arc<dyn AssetStore>,
    fetcher: RemoteFetcher,
    downstream: DownstreamClient,
    env: EnvLookup,
    asset_ttl: Duration,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<Catalog>,
        ledger: Arc<dyn Ledger>,
        requests: Arc<dyn RequestLogger>,
        assets: Arc<dyn AssetStore>,
        fetcher: RemoteFetcher,
        downstream: DownstreamClient,
    ) -> Self {
        Self {
            catalog,
            ledger,
            requests,
            assets,
            fetcher,
            downstream,
            env: Arc::new(|name: &str| std::env::var(name).ok()),
            asset_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    pub fn with_asset_ttl(mut self, ttl: Duration) -> Self {
        self.asset_ttl = ttl;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Runs one call through the state machine. Every failure after the
    /// reservation refunds the held amount and leaves a `failed` record with
    /// cost 0.
    #[instrument(skip_all, fields(user_id = %identity.user_id, api_id = %call.api_id))]
    pub async fn execute(
        &self,
        identity: &AuthenticatedIdentity,
        call: ProxyCall,
    ) -> Result<ProxyOutcome, PipelineFailure> {
        let user_id = identity.user_id.as_str();
        let api_id = call.api_id.as_str();

        if !identity.can_call(api_id) {
            warn!("key is not permitted to call this API");
            return Err(PipelineFailure::new(
                PipelineStage::Authorizing,
                IdentityError::Forbidden(api_id.to_string()),
            ));
        }

        let api = self
            .catalog
            .resolve_with(api_id, |name| (self.env)(name))
            .map_err(|err| {
                info!(error = %err, "catalog gate refused call");
                PipelineFailure::new(PipelineStage::Estimating, err)
            })?;
        let estimate = api.estimate();

        self.requests
            .ensure_encryptable(call.options.encrypt)
            .map_err(|err| PipelineFailure::new(PipelineStage::Estimating, err))?;

        let inbound = parse_inbound(
            call.content_type.as_deref(),
            &call.body,
            api.definition.accepts_file(),
        )
        .map_err(|err| {
            info!(error = %err, "inbound payload rejected");
            PipelineFailure::new(PipelineStage::Estimating, PipelineError::Validation(err))
        })?;

        let reserved_balance = self
            .ledger
            .reserve(user_id, estimate.estimated)
            .await
            .map_err(|err| PipelineFailure::new(PipelineStage::Reserving, err))?;
        info!(estimated = %estimate.estimated, balance = %reserved_balance, "reserved estimate");

        let request_id = match self.requests.begin(user_id, api_id).await {
            Ok(request_id) => request_id,
            Err(err) => {
                error!(error = %err, "unable to log pending request");
                self.refund(user_id, estimate.estimated).await;
                return Err(PipelineFailure::new(PipelineStage::LoggingPending, err));
            }
        };

        let ctx = CallContext {
            user_id,
            api: &api,
            estimate,
            request_id,
            options: call.options,
        };

        match self.run_reserved(&ctx, inbound).await {
            Ok(outcome) => {
                info!(
                    request_id = %request_id,
                    stage = %PipelineStage::Done,
                    estimated = %estimate.estimated,
                    actual = %outcome.funds.actual,
                    remaining = %outcome.funds.remaining,
                    latency_ms = outcome.latency.as_millis() as u64,
                    "call completed"
                );
                Ok(outcome)
            }
            Err(failure) => Err(self.compensate(&ctx, failure).await),
        }
    }

    async fn run_reserved(
        &self,
        ctx: &CallContext<'_>,
        inbound: InboundPayload,
    ) -> Result<ProxyOutcome, HeldFailure> {
        let mut held = ctx.estimate.estimated;
        let fail = |stage: PipelineStage, held: Credits| {
            move |error: PipelineError| HeldFailure { stage, error, held }
        };

        let outbound = self
            .transport(ctx, inbound)
            .await
            .map_err(fail(PipelineStage::Transporting, held))?;

        let response = self
            .downstream
            .invoke(&ctx.api.endpoint, outbound)
            .await
            .map_err(|source| PipelineError::Downstream {
                api_id: ctx.api.id().to_string(),
                source,
            })
            .map_err(fail(PipelineStage::Invoking, held))?;

        let actual = ctx.estimate.actual_cost(response.latency);
        let remaining = self
            .ledger
            .reconcile(ctx.user_id, actual, ctx.estimate.estimated)
            .await
            .map_err(PipelineError::from)
            .map_err(fail(PipelineStage::Reconciling, held))?;
        held = actual;

        let mut body = self
            .store_outputs(ctx, response.body)
            .await
            .map_err(fail(PipelineStage::Reconciling, held))?;

        let funds = FundsSummary { remaining, actual };
        attach_funds(&mut body, funds);

        self.requests
            .update(
                ctx.request_id,
                RequestUpdate::status(RequestStatus::Success)
                    .with_response(body.clone())
                    .with_cost(actual)
                    .encrypted(ctx.options.encrypt),
            )
            .await
            .map_err(PipelineError::from)
            .map_err(fail(PipelineStage::LoggingFinal, held))?;

        Ok(ProxyOutcome {
            request_id: ctx.request_id,
            body,
            funds,
            latency: response.latency,
        })
    }

    /// Normalises the input, persists it unless `noSave` was given and
    /// records a lightweight description on the pending entry.
    async fn transport(
        &self,
        ctx: &CallContext<'_>,
        inbound: InboundPayload,
    ) -> Result<OutboundBody, PipelineError> {
        let kind = inbound.kind();
        let file = match inbound {
            InboundPayload::Json(value) => {
                self.log_pending(ctx, value.clone()).await?;
                return Ok(OutboundBody::Json(value));
            }
            InboundPayload::RemoteUrl { url, request } => {
                self.log_pending(ctx, request).await?;
                self.fetcher.fetch(&url).await.map_err(PipelineError::Fetch)?
            }
            InboundPayload::Upload(file) => file,
        };

        let description = if ctx.options.no_save {
            json!({
                "type": kind,
                "file_name": file.file_name,
                "content_type": file.content_type,
                "size": file.len(),
                "saved": false,
            })
        } else {
            let url = self.store_input(ctx, &file).await?;
            json!({
                "url": url,
                "type": kind,
                "file_name": file.file_name,
                "content_type": file.content_type,
            })
        };
        self.log_pending(ctx, description).await?;

        Ok(OutboundBody::Multipart(encode_multipart(
            &file,
            &ctx.api.definition.request.field,
        )))
    }

    async fn store_input(
        &self,
        ctx: &CallContext<'_>,
        file: &FilePayload,
    ) -> Result<Option<String>, PipelineError> {
        let key = AssetKey::new(ctx.user_id, ctx.request_id, file.file_name.clone())?;
        let url = self
            .assets
            .store(&key, &file.content_type, file.bytes.clone(), Some(self.asset_ttl))
            .await?;
        Ok(url)
    }

    async fn log_pending(&self, ctx: &CallContext<'_>, request: Value) -> Result<(), PipelineError> {
        self.requests
            .update(
                ctx.request_id,
                RequestUpdate::status(RequestStatus::Pending)
                    .with_request(request)
                    .encrypted(ctx.options.encrypt),
            )
            .await?;
        Ok(())
    }

    /// Replaces base64 image outputs declared in the catalog with signed
    /// URLs of the stored artifact.
    async fn store_outputs(
        &self,
        ctx: &CallContext<'_>,
        body: Value,
    ) -> Result<Value, PipelineError> {
        let mut body = match body {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };

        for output in ctx.api.definition.image_outputs() {
            let Some(encoded) = body.get(&output.id).and_then(Value::as_str) else {
                continue;
            };
            let bytes = match decode_image(encoded) {
                Some(bytes) => bytes,
                None => {
                    warn!(output = %output.id, "image output is not base64, leaving it untouched");
                    continue;
                }
            };

            let file_name = format!("{}-{}-{}.png", ctx.request_id, ctx.api.id(), output.id);
            let key = AssetKey::new(ctx.user_id, ctx.request_id, file_name)?;
            let url = self
                .assets
                .store(&key, OUTPUT_IMAGE_CONTENT_TYPE, Bytes::from(bytes), Some(self.asset_ttl))
                .await?;
            body.insert(output.id.clone(), url.map(Value::String).unwrap_or(Value::Null));
        }

        Ok(Value::Object(body))
    }

    async fn compensate(&self, ctx: &CallContext<'_>, failure: HeldFailure) -> PipelineFailure {
        let HeldFailure { stage, error, held } = failure;
        warn!(
            request_id = %ctx.request_id,
            stage = %stage,
            error = %error,
            "call failed after reservation"
        );

        let (error, remaining) = match self.ledger.refund(ctx.user_id, held).await {
            Ok(balance) => (error, Some(balance)),
            Err(refund_err) => {
                error!(
                    request_id = %ctx.request_id,
                    amount = %held,
                    error = %refund_err,
                    "refund failed, balance left debited"
                );
                (PipelineError::Ledger(refund_err), None)
            }
        };

        let response = json!({
            "message": error.public_message(),
            "funds": {
                "remaining": remaining,
                "actual": Credits::ZERO,
            },
        });
        if let Err(log_err) = self
            .requests
            .update(
                ctx.request_id,
                RequestUpdate::status(RequestStatus::Failed)
                    .with_response(response)
                    .with_cost(Credits::ZERO)
                    .encrypted(ctx.options.encrypt),
            )
            .await
        {
            error!(request_id = %ctx.request_id, error = %log_err, "unable to log failed request");
        }

        PipelineFailure::new(stage, error).with_request_id(ctx.request_id)
    }

    async fn refund(&self, user_id: &str, amount: Credits) {
        if let Err(err) = self.ledger.refund(user_id, amount).await {
            error!(user_id, amount = %amount, error = %err, "refund failed, balance left debited");
        }
    }
}

fn attach_funds(body: &mut Value, funds: FundsSummary) {
    if let Value::Object(map) = body {
        map.insert(
            "funds".to_string(),
            json!({ "remaining": funds.remaining, "actual": funds.actual }),
        );
    }
}

/// Accepts raw base64 or a `data:<type>;base64,` URI.
fn decode_image(encoded: &str) -> Option<Vec<u8>> {
    let payload = match encoded.strip_prefix("data:") {
        Some(rest) => rest.split_once(";base64,")?.1,
        None => encoded,
    };
    general_purpose::STANDARD.decode(payload.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uris_and_raw_base64_decode() {
        assert_eq!(decode_image("UE5H").unwrap(), b"PNG");
        assert_eq!(decode_image("data:image/png;base64,UE5H").unwrap(), b"PNG");
        assert!(decode_image("data:image/png,UE5H").is_none());
        assert!(decode_image("https://already.a/url.png").is_none());
    }

    #[test]
    fn funds_attach_to_object_bodies() {
        let mut body = json!({ "label": "safe" });
        attach_funds(
            &mut body,
            FundsSummary {
                remaining: Credits::ZERO,
                actual: Credits::ZERO,
            },
        );
        assert_eq!(body["label"], "safe");
        assert!(body["funds"].get("remaining").is_some());
        assert!(body["funds"].get("actual").is_some());
    }
}
