//! `/api/v1/system/*` diagnostic endpoints (spec.md §8 scenarios 2-3).
//!
//! `my-ip` is a trivial downstream handler with no business meaning of its
//! own; it exists so a WAF rule has something to intercept, and so monitor
//! mode has an observable unaffected response to fall through to.

use crate::state::AppState;
use axum::extract::ConnectInfo;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;

pub fn router() -> Router<AppState> {
    Router::new().route("/system/my-ip", get(my_ip))
}

async fn my_ip(ConnectInfo(peer): ConnectInfo<SocketAddr>) -> impl IntoResponse {
    Json(json!({ "ip": peer.ip().to_string() }))
}
