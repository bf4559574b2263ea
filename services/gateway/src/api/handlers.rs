use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use request_directory_ledger::LedgerError;
use request_directory_request_log::{RequestFilter, RequestRecord};
use tracing::{error, warn};
use uuid::Uuid;

use super::types::{
    AccountQuery, AccountResponse, ApiListResponse, ApiSummary, AssetQuery, CallQuery,
    ErrorResponse, RequestListResponse,
};
use super::AppState;
use crate::assets::{AssetError, AssetKey};
use crate::identity::AuthenticatedIdentity;
use crate::pipeline::{
    PipelineError, PipelineFailure, PipelineStage, ProxyCall, GENERIC_ERROR_MESSAGE,
    REQUEST_ID_HEADER,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

const MAX_LIST_LIMIT: usize = 500;
const DEFAULT_ACCOUNT_ENTRIES: usize = 20;

/// `POST /v1/:api_id`. The call runs on its own task so a client
/// disconnect cannot abandon a reservation half way.
pub async fn proxy_call(
    State(state): State<Arc<AppState>>,
    Path(api_id): Path<String>,
    Query(query): Query<CallQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let identity = match state.identity.extract_from_request(&headers) {
        Ok(identity) => identity,
        Err(err) => return PipelineFailure::new(PipelineStage::Authorizing, err).into_response(),
    };

    let call = ProxyCall {
        api_id,
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body,
        options: query.options(),
    };

    let pipeline = Arc::clone(&state.pipeline);
    let task = tokio::spawn(async move { pipeline.execute(&identity, call).await });

    match task.await {
        Ok(Ok(outcome)) => {
            let mut response = (StatusCode::OK, Json(outcome.body)).into_response();
            if let Ok(value) = HeaderValue::from_str(&outcome.request_id.to_string()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            response
        }
        Ok(Err(failure)) => failure.into_response(),
        Err(err) => {
            error!(error = %err, "proxy task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    message: GENERIC_ERROR_MESSAGE.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// `GET /v1`: enabled APIs with their pricing and declared fields.
pub async fn list_apis(State(state): State<Arc<AppState>>) -> Response {
    let apis = state
        .catalog
        .enabled()
        .map(|definition| ApiSummary {
            path: format!("/v1/{}", definition.id),
            definition,
        })
        .collect();

    Json(ApiListResponse { apis }).into_response()
}

pub async fn account(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AccountQuery>,
    headers: HeaderMap,
) -> ApiResult<AccountResponse> {
    let identity = authenticate(&state, &headers)?;
    let user_id = identity.user_id;

    let funds = state.ledger.balance(&user_id).await.map_err(|err| match err {
        LedgerError::AccountNotFound(_) => bad_request("Failed to get user funds."),
        other => internal_error(other),
    })?;

    let limit = query
        .entries
        .unwrap_or(DEFAULT_ACCOUNT_ENTRIES)
        .min(MAX_LIST_LIMIT);
    let entries = state
        .ledger
        .entries(&user_id, limit)
        .await
        .map_err(internal_error)?;

    Ok(Json(AccountResponse {
        user_id,
        funds,
        entries,
    }))
}

pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    Query(mut filter): Query<RequestFilter>,
    headers: HeaderMap,
) -> ApiResult<RequestListResponse> {
    let identity = authenticate(&state, &headers)?;
    filter.limit = filter.limit.map(|limit| limit.min(MAX_LIST_LIMIT));

    let requests = state
        .requests
        .list(&identity.user_id, &filter)
        .await
        .map_err(internal_error)?;

    Ok(Json(RequestListResponse { requests }))
}

pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<RequestRecord> {
    let identity = authenticate(&state, &headers)?;

    state
        .requests
        .get(&identity.user_id, request_id)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Request not found."))
}

/// `GET /assets/:user_id/:request_id/:file_name` with a signed query.
pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path((user_id, request_id, file_name)): Path<(String, String, String)>,
    Query(query): Query<AssetQuery>,
) -> Response {
    let key = match AssetKey::new(user_id, request_id, file_name) {
        Ok(key) => key,
        Err(_) => return not_found("Asset not found.").into_response(),
    };

    if let Err(err) = state
        .assets
        .verify_signature(&key, query.expires, &query.signature)
    {
        warn!(asset = %key, error = %err, "rejected asset link");
        return match err {
            AssetError::Expired => error_response(StatusCode::GONE, "This link has expired."),
            _ => error_response(StatusCode::FORBIDDEN, "Invalid signature."),
        }
        .into_response();
    }

    match state.assets.open(&key).await {
        Ok(asset) => {
            let content_type = HeaderValue::from_str(&asset.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=3600")),
                ],
                asset.bytes,
            )
                .into_response()
        }
        Err(AssetError::NotFound(_)) => not_found("Asset not found.").into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

pub async fn health_check() -> ApiResult<serde_json::Value> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "gateway"
    })))
}

fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthenticatedIdentity, (StatusCode, Json<ErrorResponse>)> {
    state.identity.extract_from_request(headers).map_err(|err| {
        let err = PipelineError::from(err);
        error_response(err.status_code(), &err.public_message())
    })
}

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            message: message.to_string(),
        }),
    )
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    error_response(StatusCode::BAD_REQUEST, message)
}

fn not_found(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    error_response(StatusCode::NOT_FOUND, message)
}

fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, Json<ErrorResponse>) {
    error!(error = %err, "internal error");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE)
}
