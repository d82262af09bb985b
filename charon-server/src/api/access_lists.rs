//! `/api/v1/access-lists` CRUD (spec.md §6).

use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use charon_core::error::{ApiError, ApiResult};
use charon_types::{AccessList, AccessListType, IpRule};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/access-lists", get(list).post(create))
        .route("/access-lists/:uuid", get(get_one).put(update).delete(delete))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AccessListPayload {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AccessListType,
    #[serde(default)]
    pub ip_rules: Vec<IpRule>,
    #[serde(default)]
    pub country_codes: Vec<String>,
    #[serde(default)]
    pub local_network_only: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_true() -> bool {
    true
}

impl AccessListPayload {
    fn into_list(self, uuid: Uuid) -> Result<AccessList, ApiError> {
        for rule in &self.ip_rules {
            rule.parse().map_err(ApiError::Domain)?;
        }
        Ok(AccessList {
            uuid,
            name: self.name,
            kind: self.kind,
            ip_rules: self.ip_rules,
            country_codes: self.country_codes,
            local_network_only: self.local_network_only,
            enabled: self.enabled,
        })
    }
}

async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<AccessList>>> {
    Ok(Json(state.store().access_lists().list().await?))
}

async fn get_one(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> ApiResult<Json<AccessList>> {
    state
        .store()
        .access_lists()
        .get(uuid)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("access list not found".to_string()))
}

async fn create(
    State(state): State<AppState>,
    Json(payload): Json<AccessListPayload>,
) -> ApiResult<(axum::http::StatusCode, Json<AccessList>)> {
    payload.validate().map_err(|err| ApiError::Validation(err.to_string()))?;
    let list = payload.into_list(Uuid::new_v4())?;
    state.store().access_lists().upsert(&list).await?;
    Ok((axum::http::StatusCode::CREATED, Json(list)))
}

async fn update(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(payload): Json<AccessListPayload>,
) -> ApiResult<Json<AccessList>> {
    payload.validate().map_err(|err| ApiError::Validation(err.to_string()))?;
    if state.store().access_lists().get(uuid).await?.is_none() {
        return Err(ApiError::NotFound("access list not found".to_string()));
    }
    let list = payload.into_list(uuid)?;
    state.store().access_lists().upsert(&list).await?;
    Ok(Json(list))
}

async fn delete(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> ApiResult<axum::http::StatusCode> {
    if state.store().access_lists().is_referenced(uuid).await? {
        return Err(ApiError::Conflict("access list is still assigned to a proxy host".to_string()));
    }
    if !state.store().access_lists().delete(uuid).await? {
        return Err(ApiError::NotFound("access list not found".to_string()));
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}
