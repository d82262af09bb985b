//! `/api/v1/health` liveness probe. Unauthenticated (spec.md §6).

use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "charon-server",
        "version": env!("GIT_VERSION"),
        "git_commit": env!("GIT_COMMIT"),
        "build_time": env!("BUILD_TIME"),
    }))
}
