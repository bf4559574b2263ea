use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let middleware = ServiceBuilder::new().layer(TraceLayer::new_for_http());
    let body_limit = state.config.max_body_size_bytes;

    Router::new()
        .route("/v1", get(handlers::list_apis))
        .route("/v1/:api_id", post(handlers::proxy_call))
        .route("/account", get(handlers::account))
        .route("/requests", get(handlers::list_requests))
        .route("/requests/:request_id", get(handlers::get_request))
        .route(
            "/assets/:user_id/:request_id/:file_name",
            get(handlers::get_asset),
        )
        .route("/health", get(handlers::health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(middleware)
}
