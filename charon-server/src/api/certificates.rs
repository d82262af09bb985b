//! `/api/v1/certificates` CRUD (spec.md §6).
//!
//! Let's Encrypt certificates are issued implicitly by the data plane;
//! only `CertificateProvider::Custom` certs may be created here (spec.md
//! §4.1 step 2, §8 scenario 5's startup scrub enforces the same rule for
//! whatever slips through).

use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use charon_core::error::{ApiError, ApiResult};
use charon_types::{Certificate, CertificateProvider};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/certificates", get(list).post(create))
        .route("/certificates/:uuid", get(get_one).delete(delete))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CertificatePayload {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub domains: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Certificate>>> {
    Ok(Json(state.store().certificates().list().await?))
}

async fn get_one(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> ApiResult<Json<Certificate>> {
    state
        .store()
        .certificates()
        .get(uuid)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("certificate not found".to_string()))
}

async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CertificatePayload>,
) -> ApiResult<(axum::http::StatusCode, Json<Certificate>)> {
    payload.validate().map_err(|err| ApiError::Validation(err.to_string()))?;
    let certificate = Certificate {
        uuid: Uuid::new_v4(),
        name: payload.name,
        provider: CertificateProvider::Custom,
        domains: payload.domains,
        expires_at: payload.expires_at,
    };
    state.store().certificates().upsert(&certificate).await?;
    Ok((axum::http::StatusCode::CREATED, Json(certificate)))
}

async fn delete(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> ApiResult<axum::http::StatusCode> {
    if !state.store().certificates().delete(uuid).await? {
        return Err(ApiError::NotFound("certificate not found".to_string()));
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}
