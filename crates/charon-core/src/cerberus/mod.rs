//! Security middleware pipeline ("Cerberus"), spec.md §4.2.
//!
//! An `axum::middleware::from_fn_with_state` layer guarding the management
//! API. Grounded on the reference crate's
//! `middleware::auth::auth_middleware_internal` short-circuit structure and
//! its `Arc<RwLock<ProxySecurityConfig>>` once-per-request snapshot read,
//! generalized from a single API-key check into the four-step pipeline.

mod breakglass;
pub mod metrics;
mod snapshot;
pub mod waf;

pub use breakglass::{authorize as authorize_break_glass, issue as issue_break_glass_token, would_lock_out};
pub use snapshot::{parse_ip_list, CerberusSnapshot};

use crate::store::Store;
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use charon_types::{AccessDecision, AclMode, WafMode};
use ipnet::IpNet;
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Bodies larger than this are never inspected by the WAF step; they pass
/// through unread rather than buffering an unbounded upload in memory.
const MAX_INSPECTED_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct CerberusState {
    store: Store,
    snapshot: Arc<RwLock<CerberusSnapshot>>,
    trusted_proxies: Vec<IpNet>,
    runtime_toggle: Arc<AtomicBool>,
}

impl CerberusState {
    pub async fn load(store: Store, trusted_proxies: Vec<IpNet>) -> Result<Self, sqlx::Error> {
        let snapshot = snapshot::load(&store).await?;
        Ok(Self {
            store,
            snapshot: Arc::new(RwLock::new(snapshot)),
            trusted_proxies,
            runtime_toggle: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Sets the runtime `security.cerberus.enabled` override (spec.md §4.2
    /// enablement rule) independent of the stored config's own toggles.
    pub fn set_runtime_toggle(&self, enabled: bool) {
        self.runtime_toggle.store(enabled, Ordering::Relaxed);
    }

    pub async fn refresh(&self) -> Result<(), sqlx::Error> {
        let fresh = snapshot::load(&self.store).await?;
        *self.snapshot.write().await = fresh;
        Ok(())
    }
}

/// Periodically reloads the snapshot so config changes made through the
/// admin API reach the middleware without a database round trip on every
/// request, mirroring the health monitor's background-task shutdown switch.
pub fn spawn_refresh_task(
    state: CerberusState,
) -> (tokio::sync::watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = state.refresh().await {
                        tracing::error!(%err, "cerberus snapshot refresh failed");
                    }
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("cerberus refresh task shutting down");
                    break;
                }
            }
        }
    });

    (shutdown_tx, handle)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// spec.md §4.2 client-IP rule: the transport peer is authoritative unless
/// it is itself a trusted proxy, in which case `X-Forwarded-For` is
/// promoted. Untrusted peers never get their forwarded header honored, so
/// the header stays out of logs for them (redaction is the caller's job).
fn resolve_client_ip(headers: &HeaderMap, peer: IpAddr, trusted_proxies: &[IpNet]) -> IpAddr {
    if !trusted_proxies.iter().any(|net| net.contains(&peer)) {
        return peer;
    }
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(peer)
}

fn ip_in_any(ip: IpAddr, nets: &[IpNet]) -> bool {
    nets.iter().any(|net| net.contains(&ip))
}

pub async fn cerberus_middleware(
    State(state): State<CerberusState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let snapshot = state.snapshot.read().await;
    let runtime_toggle = state.runtime_toggle.load(Ordering::Relaxed);

    if !snapshot.is_enabled(runtime_toggle) {
        drop(snapshot);
        return next.run(request).await;
    }

    let client_ip = resolve_client_ip(request.headers(), peer.ip(), &state.trusted_proxies);
    metrics::record_evaluation();

    // Step 1: WAF. Runs even when the remaining steps are skipped by the
    // admin whitelist, since the WAF is a payload check, not a caller check.
    metrics::record_waf_request();

    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().unwrap_or_default().to_string();
    let path_and_query =
        parts.uri.path_and_query().map_or_else(|| path.clone(), std::string::ToString::to_string);
    let header_values: Vec<&str> = parts.headers.values().filter_map(|v| v.to_str().ok()).collect();

    let body_bytes = to_bytes(body, MAX_INSPECTED_BODY_BYTES).await.unwrap_or_else(|_| Bytes::new());
    let body_str = std::str::from_utf8(&body_bytes).ok();

    if let Some(ruleset) = snapshot.active_ruleset.as_ref() {
        let surface = waf::request_surface(&path_and_query, &header_values, body_str);
        if ruleset.is_match(&surface) {
            match snapshot.security.waf_mode {
                WafMode::Block => {
                    metrics::record_waf_blocked();
                    tracing::warn!(
                        source = "waf",
                        decision = "block",
                        mode = ?snapshot.security.waf_mode,
                        %path,
                        %query,
                        "cerberus waf match"
                    );
                    return error_response(StatusCode::BAD_REQUEST, "WAF: suspicious payload detected");
                },
                WafMode::Monitor => {
                    metrics::record_waf_monitored();
                    tracing::warn!(
                        source = "waf",
                        decision = "monitor",
                        mode = ?snapshot.security.waf_mode,
                        %path,
                        %query,
                        "cerberus waf match"
                    );
                },
                WafMode::Disabled => {},
            }
        }
    }

    let request = Request::from_parts(parts, Body::from(body_bytes));

    // Step 2: admin whitelist bypasses everything below.
    if ip_in_any(client_ip, &snapshot.admin_whitelist) {
        return next.run(request).await;
    }

    // Step 3: ACL, deterministic by name (AccessListStore::list orders so).
    if snapshot.security.acl_mode == AclMode::Enabled {
        for acl in snapshot.access_lists.iter().filter(|a| a.enabled) {
            if acl.test_ip(client_ip, None) == AccessDecision::Deny {
                metrics::record_acl_denied();
                tracing::warn!(source = "acl", list = %acl.name, ip = %client_ip, "cerberus acl deny");
                return error_response(StatusCode::FORBIDDEN, "Blocked by access control list");
            }
        }
    }

    // Step 4: CrowdSec / rate-limit. Reserved; always passes when
    // unconfigured (spec.md §4.2 step 4 — not designed here).
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(cidr: &str) -> IpNet {
        cidr.parse().unwrap()
    }

    #[test]
    fn untrusted_peer_forwarded_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());
        let peer: IpAddr = "1.2.3.4".parse().unwrap();
        let resolved = resolve_client_ip(&headers, peer, &[]);
        assert_eq!(resolved, peer);
    }

    #[test]
    fn trusted_proxy_forwarded_header_is_promoted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let resolved = resolve_client_ip(&headers, peer, &[net("10.0.0.0/8")]);
        assert_eq!(resolved, "203.0.113.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn ip_in_any_matches_containing_cidr() {
        assert!(ip_in_any("10.1.2.3".parse().unwrap(), &[net("10.0.0.0/8")]));
        assert!(!ip_in_any("8.8.8.8".parse().unwrap(), &[net("10.0.0.0/8")]));
    }
}
