//! `/api/v1/security` endpoints (spec.md §4.2, §6, §8 scenario 4).
//!
//! Enabling or disabling Cerberus globally, or writing a config that would
//! land in `waf_mode=block` with no admin whitelist, can lock the caller
//! out of the management API. Both lockout shapes get their own gate:
//! [`would_lock_out`] (narrow, WAF-specific) guards the direct config PUT,
//! while [`would_enable_lock_out`] guards the coarse enable switch, since
//! enabling Cerberus at all without an admin whitelist is already a
//! lockout risk regardless of WAF mode.

use crate::state::AppState;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use charon_core::cerberus::{authorize_break_glass, issue_break_glass_token, parse_ip_list, would_lock_out};
use charon_core::error::{ApiError, ApiResult};
use charon_types::{SecurityConfig, SecurityRuleSet};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

const BREAK_GLASS_HEADER: &str = "x-break-glass-token";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/security/config", get(get_config).put(put_config))
        .route("/security/enable", post(enable))
        .route("/security/disable", post(disable))
        .route("/security/breakglass/generate", post(generate_break_glass))
        .route("/security/rulesets", get(list_rulesets).post(upsert_ruleset))
        .route("/security/rulesets/:uuid", axum::routing::put(update_ruleset))
}

async fn get_config(State(state): State<AppState>) -> ApiResult<Json<SecurityConfig>> {
    Ok(Json(state.store().security().get_config().await?))
}

/// Changes that would land in `waf_mode=block` with no admin whitelist
/// require the same authorization as enabling (spec.md §4.2).
async fn put_config(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(next): Json<SecurityConfig>,
) -> ApiResult<Json<SecurityConfig>> {
    if would_lock_out(&next) {
        let token = break_glass_header(&headers);
        if !authorize_break_glass(state.store(), Some(peer.ip()), token).await? {
            return Err(ApiError::BadRequest(
                "this change would enable waf block mode with no admin_whitelist entries; \
                 retry from a loopback address or with a valid break-glass token"
                    .to_string(),
            ));
        }
    }

    state.store().security().save_config(&next).await?;
    state.store().audit().record("security.config.update", None, serde_json::to_value(&next).unwrap_or_default()).await?;
    state.inner.cerberus.refresh().await?;

    Ok(Json(next))
}

fn break_glass_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(BREAK_GLASS_HEADER).and_then(|v| v.to_str().ok())
}

/// Broader than [`would_lock_out`]: turning Cerberus on at all with no
/// admin whitelist is a lockout risk, independent of `waf_mode`.
fn would_enable_lock_out(next: &SecurityConfig) -> bool {
    next.enabled && !next.has_admin_whitelist()
}

fn admin_whitelist_matches(whitelist_csv: &str, ip: std::net::IpAddr) -> bool {
    parse_ip_list(whitelist_csv).iter().any(|net| net.contains(&ip))
}

/// Three-way gate shared by `/enable` and `/disable`: loopback origin,
/// a caller IP already present in the *current* admin whitelist, or a
/// valid break-glass token. None of these require the request to already
/// be past Cerberus, since this check stands in for it on this one route.
async fn authorize_security_change(
    state: &AppState,
    peer_ip: std::net::IpAddr,
    headers: &HeaderMap,
) -> Result<bool, sqlx::Error> {
    if peer_ip.is_loopback() {
        return Ok(true);
    }
    let current = state.store().security().get_config().await?;
    if admin_whitelist_matches(&current.admin_whitelist, peer_ip) {
        return Ok(true);
    }
    authorize_break_glass(state.store(), None, break_glass_header(headers)).await
}

#[derive(Debug, Default, Deserialize)]
pub struct SecurityOverride {
    #[serde(default)]
    pub admin_whitelist: Option<String>,
    #[serde(default)]
    pub waf_mode: Option<charon_types::WafMode>,
    #[serde(default)]
    pub waf_rules_source: Option<String>,
    #[serde(default)]
    pub acl_mode: Option<charon_types::AclMode>,
    #[serde(default)]
    pub rate_limit_mode: Option<charon_types::RateLimitMode>,
    #[serde(default)]
    pub rate_limit_requests_per_minute: Option<u32>,
    #[serde(default)]
    pub crowdsec_mode: Option<charon_types::CrowdsecMode>,
    #[serde(default)]
    pub crowdsec_api_url: Option<String>,
}

impl SecurityOverride {
    fn apply_onto(self, mut base: SecurityConfig) -> SecurityConfig {
        if let Some(admin_whitelist) = self.admin_whitelist {
            base.admin_whitelist = admin_whitelist;
        }
        if let Some(waf_mode) = self.waf_mode {
            base.waf_mode = waf_mode;
        }
        if self.waf_rules_source.is_some() {
            base.waf_rules_source = self.waf_rules_source;
        }
        if let Some(acl_mode) = self.acl_mode {
            base.acl_mode = acl_mode;
        }
        if let Some(rate_limit_mode) = self.rate_limit_mode {
            base.rate_limit_mode = rate_limit_mode;
        }
        if self.rate_limit_requests_per_minute.is_some() {
            base.rate_limit_requests_per_minute = self.rate_limit_requests_per_minute;
        }
        if let Some(crowdsec_mode) = self.crowdsec_mode {
            base.crowdsec_mode = crowdsec_mode;
        }
        if self.crowdsec_api_url.is_some() {
            base.crowdsec_api_url = self.crowdsec_api_url;
        }
        base
    }
}

/// spec.md §8 scenario 4: rejecting a lockout-risking enable from a
/// non-privileged caller must surface `admin_whitelist` in the error.
async fn enable(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(overrides): Json<SecurityOverride>,
) -> ApiResult<Json<SecurityConfig>> {
    let current = state.store().security().get_config().await?;
    let mut next = overrides.apply_onto(current);
    next.enabled = true;

    if would_enable_lock_out(&next) && !authorize_security_change(&state, peer.ip(), &headers).await? {
        return Err(ApiError::BadRequest(
            "enabling security with no admin_whitelist entries would lock out the caller; \
             retry from a loopback address, a whitelisted address, or with a valid break-glass token"
                .to_string(),
        ));
    }

    state.store().security().save_config(&next).await?;
    state.store().audit().record("security.enable", None, serde_json::to_value(&next).unwrap_or_default()).await?;
    state.inner.cerberus.refresh().await?;

    Ok(Json(next))
}

async fn disable(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> ApiResult<Json<SecurityConfig>> {
    if !authorize_security_change(&state, peer.ip(), &headers).await? {
        return Err(ApiError::Forbidden(
            "disabling security requires a loopback, whitelisted, or break-glass-authorized caller".to_string(),
        ));
    }

    let mut next = state.store().security().get_config().await?;
    next.enabled = false;

    state.store().security().save_config(&next).await?;
    state.store().audit().record("security.disable", None, serde_json::to_value(&next).unwrap_or_default()).await?;
    state.inner.cerberus.refresh().await?;

    Ok(Json(next))
}

#[derive(Debug, Serialize)]
struct BreakGlassResponse {
    token: String,
}

async fn generate_break_glass(State(state): State<AppState>) -> ApiResult<Json<BreakGlassResponse>> {
    let token = issue_break_glass_token(state.store()).await?;
    state.store().audit().record("security.breakglass.generate", None, serde_json::json!({})).await?;
    Ok(Json(BreakGlassResponse { token }))
}

async fn list_rulesets(State(state): State<AppState>) -> ApiResult<Json<Vec<SecurityRuleSet>>> {
    Ok(Json(state.store().security().list_rulesets().await?))
}

async fn upsert_ruleset(
    State(state): State<AppState>,
    Json(mut ruleset): Json<SecurityRuleSet>,
) -> ApiResult<(axum::http::StatusCode, Json<SecurityRuleSet>)> {
    if ruleset.uuid.is_nil() {
        ruleset.uuid = Uuid::new_v4();
    }
    state.store().security().upsert_ruleset(&ruleset).await?;
    state.inner.cerberus.refresh().await?;
    Ok((axum::http::StatusCode::CREATED, Json(ruleset)))
}

async fn update_ruleset(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(mut ruleset): Json<SecurityRuleSet>,
) -> ApiResult<Json<SecurityRuleSet>> {
    ruleset.uuid = uuid;
    state.store().security().upsert_ruleset(&ruleset).await?;
    state.inner.cerberus.refresh().await?;
    Ok(Json(ruleset))
}
