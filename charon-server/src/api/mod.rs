//! HTTP handler modules, one per resource (spec.md §6).

pub mod access_lists;
pub mod certificates;
pub mod health;
pub mod metrics;
pub mod proxy_hosts;
pub mod security;
pub mod system;
pub mod uptime;

use crate::state::AppState;
use axum::Router;

/// Everything behind the Cerberus pipeline. `health` and `metrics` stay
/// out of this tree; `router::build_router` mounts them separately so
/// they're reachable even while Cerberus is misconfigured.
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .merge(proxy_hosts::router())
        .merge(access_lists::router())
        .merge(certificates::router())
        .merge(security::router())
        .merge(system::router())
        .merge(uptime::router())
}
