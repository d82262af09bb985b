//! `/api/v1/proxy-hosts` CRUD and the bulk ACL assignment endpoint
//! (spec.md §6, §8 scenario 1).

use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use charon_core::error::{ApiError, ApiResult};
use charon_types::{ApplicationPreset, ForwardScheme, Location, ProxyHost};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/proxy-hosts", get(list).post(create))
        .route("/proxy-hosts/bulk-update-acl", put(bulk_update_acl))
        .route("/proxy-hosts/:uuid", get(get_one).put(update).delete(delete))
}

#[derive(Debug, Deserialize)]
pub struct LocationPayload {
    pub path: String,
    #[serde(default)]
    pub forward_scheme: ForwardScheme,
    pub forward_host: String,
    pub forward_port: u16,
    #[serde(default)]
    pub advanced_config: Option<String>,
}

impl LocationPayload {
    fn into_location(self) -> Location {
        Location {
            uuid: Uuid::new_v4(),
            path: self.path,
            forward_scheme: self.forward_scheme,
            forward_host: self.forward_host,
            forward_port: self.forward_port,
            advanced_config: self.advanced_config,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProxyHostPayload {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub domain_names: Vec<String>,
    #[serde(default)]
    pub forward_scheme: ForwardScheme,
    #[validate(length(min = 1))]
    pub forward_host: String,
    pub forward_port: u16,
    #[serde(default)]
    pub ssl_forced: bool,
    #[serde(default)]
    pub http2_support: bool,
    #[serde(default)]
    pub hsts_enabled: bool,
    #[serde(default)]
    pub hsts_subdomains: bool,
    #[serde(default)]
    pub block_exploits: bool,
    #[serde(default)]
    pub websocket_support: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub application_preset: ApplicationPreset,
    #[serde(default)]
    pub advanced_config: Option<String>,
    #[serde(default)]
    pub certificate_id: Option<Uuid>,
    #[serde(default)]
    pub access_list_id: Option<Uuid>,
    #[serde(default)]
    pub forward_auth_policy_id: Option<Uuid>,
    #[serde(default)]
    pub locations: Vec<LocationPayload>,
}

impl ProxyHostPayload {
    fn into_host(self, uuid: Uuid) -> ProxyHost {
        ProxyHost {
            uuid,
            name: self.name,
            domain_names: self.domain_names,
            forward_scheme: self.forward_scheme,
            forward_host: self.forward_host,
            forward_port: self.forward_port,
            ssl_forced: self.ssl_forced,
            http2_support: self.http2_support,
            hsts_enabled: self.hsts_enabled,
            hsts_subdomains: self.hsts_subdomains,
            block_exploits: self.block_exploits,
            websocket_support: self.websocket_support,
            enabled: self.enabled,
            application_preset: self.application_preset,
            advanced_config: self.advanced_config,
            certificate_id: self.certificate_id,
            access_list_id: self.access_list_id,
            forward_auth_policy_id: self.forward_auth_policy_id,
            locations: self.locations.into_iter().map(LocationPayload::into_location).collect(),
        }
    }
}

const fn default_true() -> bool {
    true
}

async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<ProxyHost>>> {
    Ok(Json(state.store().proxy_hosts().list().await?))
}

async fn get_one(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> ApiResult<Json<ProxyHost>> {
    state
        .store()
        .proxy_hosts()
        .get(uuid)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("proxy host not found".to_string()))
}

async fn domain_conflict(state: &AppState, domains: &[String], excluding: Option<Uuid>) -> Result<bool, sqlx::Error> {
    let existing = state.store().proxy_hosts().list().await?;
    Ok(existing
        .iter()
        .filter(|h| Some(h.uuid) != excluding)
        .any(|h| h.domain_names.iter().any(|d| domains.contains(d))))
}

async fn create(
    State(state): State<AppState>,
    Json(payload): Json<ProxyHostPayload>,
) -> ApiResult<(axum::http::StatusCode, Json<ProxyHost>)> {
    payload.validate().map_err(|err| ApiError::Validation(err.to_string()))?;

    if domain_conflict(&state, &payload.domain_names, None).await? {
        return Err(ApiError::Conflict("domain name already in use".to_string()));
    }

    let host = payload.into_host(Uuid::new_v4());
    state.store().proxy_hosts().upsert(&host).await?;
    state.apply().request("proxy host created").await?;

    Ok((axum::http::StatusCode::CREATED, Json(host)))
}

async fn update(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(payload): Json<ProxyHostPayload>,
) -> ApiResult<Json<ProxyHost>> {
    payload.validate().map_err(|err| ApiError::Validation(err.to_string()))?;

    if state.store().proxy_hosts().get(uuid).await?.is_none() {
        return Err(ApiError::NotFound("proxy host not found".to_string()));
    }
    if domain_conflict(&state, &payload.domain_names, Some(uuid)).await? {
        return Err(ApiError::Conflict("domain name already in use".to_string()));
    }

    let host = payload.into_host(uuid);
    state.store().proxy_hosts().upsert(&host).await?;
    state.apply().request("proxy host updated").await?;

    Ok(Json(host))
}

async fn delete(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> ApiResult<axum::http::StatusCode> {
    if !state.store().proxy_hosts().delete(uuid).await? {
        return Err(ApiError::NotFound("proxy host not found".to_string()));
    }
    state.apply().request("proxy host deleted").await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct BulkUpdateAclRequest {
    host_uuids: Vec<Uuid>,
    access_list_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct BulkUpdateAclError {
    uuid: Uuid,
    error: String,
}

#[derive(Debug, Serialize)]
struct BulkUpdateAclResponse {
    updated: usize,
    errors: Vec<BulkUpdateAclError>,
}

/// spec.md §8 scenario 1: partial failure reports unmatched uuids as
/// `errors` without aborting the batch; exactly one `ApplyConfig` call is
/// made regardless of how many hosts changed.
async fn bulk_update_acl(
    State(state): State<AppState>,
    Json(request): Json<BulkUpdateAclRequest>,
) -> ApiResult<Json<BulkUpdateAclResponse>> {
    let updated_uuids =
        state.store().proxy_hosts().bulk_set_access_list(&request.host_uuids, request.access_list_id).await?;

    let errors = request
        .host_uuids
        .iter()
        .filter(|uuid| !updated_uuids.contains(uuid))
        .map(|&uuid| BulkUpdateAclError { uuid, error: "proxy host not found".to_string() })
        .collect();

    if !updated_uuids.is_empty() {
        state.apply().request("bulk ACL update").await?;
    }

    Ok(Json(BulkUpdateAclResponse { updated: updated_uuids.len(), errors }))
}
