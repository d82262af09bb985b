//! `/api/v1/uptime` monitor CRUD and heartbeat history (spec.md §4.3, §6).
//!
//! Monitors derived from a `ProxyHost` (`proxy_host_uuid` set) are not
//! created directly through this API; the projection engine owns that
//! 1:1 relationship.

use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use charon_core::error::{ApiError, ApiResult};
use charon_types::{MonitorType, UptimeHeartbeat, UptimeMonitor};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/uptime/monitors", get(list).post(create))
        .route("/uptime/monitors/:uuid", get(get_one).put(update).delete(delete))
        .route("/uptime/monitors/:uuid/heartbeats", get(heartbeats))
}

#[derive(Debug, Deserialize, Validate)]
pub struct MonitorPayload {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MonitorType,
    #[validate(length(min = 1))]
    pub url: String,
    pub interval_seconds: u32,
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_retries() -> u32 {
    3
}

const fn default_true() -> bool {
    true
}

impl MonitorPayload {
    fn into_monitor(self, uuid: Uuid) -> UptimeMonitor {
        UptimeMonitor {
            uuid,
            name: self.name,
            kind: self.kind,
            url: self.url,
            interval_seconds: self.interval_seconds,
            max_retries: self.max_retries,
            enabled: self.enabled,
            last_state: charon_types::MonitorState::Unknown,
            last_latency_ms: None,
            last_checked_at: None,
            proxy_host_uuid: None,
            consecutive_failures: 0,
        }
    }
}

async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<UptimeMonitor>>> {
    Ok(Json(state.store().uptime().list().await?))
}

async fn get_one(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> ApiResult<Json<UptimeMonitor>> {
    state
        .store()
        .uptime()
        .get(uuid)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("uptime monitor not found".to_string()))
}

async fn create(
    State(state): State<AppState>,
    Json(payload): Json<MonitorPayload>,
) -> ApiResult<(axum::http::StatusCode, Json<UptimeMonitor>)> {
    payload.validate().map_err(|err| ApiError::Validation(err.to_string()))?;
    let monitor = payload.into_monitor(Uuid::new_v4());
    state.store().uptime().upsert(&monitor).await?;
    Ok((axum::http::StatusCode::CREATED, Json(monitor)))
}

async fn update(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(payload): Json<MonitorPayload>,
) -> ApiResult<Json<UptimeMonitor>> {
    payload.validate().map_err(|err| ApiError::Validation(err.to_string()))?;
    let existing = state
        .store()
        .uptime()
        .get(uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound("uptime monitor not found".to_string()))?;
    if existing.proxy_host_uuid.is_some() {
        return Err(ApiError::Conflict(
            "monitor is derived from a proxy host and cannot be edited directly".to_string(),
        ));
    }
    let mut monitor = payload.into_monitor(uuid);
    monitor.last_state = existing.last_state;
    monitor.last_latency_ms = existing.last_latency_ms;
    monitor.last_checked_at = existing.last_checked_at;
    monitor.consecutive_failures = existing.consecutive_failures;
    state.store().uptime().upsert(&monitor).await?;
    Ok(Json(monitor))
}

async fn delete(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> ApiResult<axum::http::StatusCode> {
    let existing = state
        .store()
        .uptime()
        .get(uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound("uptime monitor not found".to_string()))?;
    if existing.proxy_host_uuid.is_some() {
        return Err(ApiError::Conflict(
            "monitor is derived from a proxy host and cannot be deleted directly".to_string(),
        ));
    }
    state.store().uptime().delete(uuid).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct HeartbeatQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

const fn default_limit() -> i64 {
    50
}

async fn heartbeats(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Query(query): Query<HeartbeatQuery>,
) -> ApiResult<Json<Vec<UptimeHeartbeat>>> {
    if state.store().uptime().get(uuid).await?.is_none() {
        return Err(ApiError::NotFound("uptime monitor not found".to_string()));
    }
    Ok(Json(state.store().uptime().heartbeats(uuid, query.limit).await?))
}
