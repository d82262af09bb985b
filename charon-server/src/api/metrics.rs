//! `/metrics` Prometheus text exposition. Unauthenticated (spec.md §6),
//! mirroring the reference crate's own `/metrics` route.

use axum::response::IntoResponse;

pub async fn render() -> impl IntoResponse {
    charon_core::cerberus::metrics::render()
}
