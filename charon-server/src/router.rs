//! Router composition.
//!
//! Follows the reference crate's `router::build_router` split exactly: an
//! outer `Router<AppState>` nesting `/api/v1` behind Cerberus (generalizing
//! the reference's `admin_auth_middleware` layering over `/api`), a small
//! set of always-public routes (`/api/v1/health`, `/metrics`), and
//! `TraceLayer` + `CorsLayer` applied last, matching that layer ordering.

use crate::middleware::{panic_response, request_context_layer, request_id_layer, with_redacted_tracing};
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::middleware as axum_middleware;
use axum::routing::get;
use axum::Router;
use charon_core::cerberus::cerberus_middleware;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};

pub fn build_router(state: AppState) -> Router {
    let cerberus_state = state.inner.cerberus.clone();

    let protected = Router::new()
        .nest("/api/v1", crate::api::protected_router())
        .layer(axum_middleware::from_fn_with_state(cerberus_state, cerberus_middleware));

    let public = Router::new()
        .route("/api/v1/health", get(crate::api::health::health))
        .route("/metrics", get(crate::api::metrics::render));

    let router = protected.merge(public).with_state(state);

    let router = with_redacted_tracing(router);

    router
        .layer(axum_middleware::from_fn(request_id_layer))
        .layer(axum_middleware::from_fn(request_context_layer))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}
