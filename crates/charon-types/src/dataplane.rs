//! JSON document shapes understood by the data-plane admin API.
//!
//! The data plane is an external collaborator (spec.md §1) assumed to be a
//! Caddy-like HTTP proxy exposing a JSON admin endpoint. These DTOs model
//! only the fields the projection engine writes — enough to describe
//! sites, routes, TLS policy markers, and WAF handler bindings. Anything
//! the data plane accepts beyond this (its own ACME state, logging config,
//! etc.) is left alone by never being round-tripped through these types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level admin config document: `{"apps": {"http": {"servers": {...}}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaddyConfig {
    pub apps: CaddyApps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaddyApps {
    pub http: CaddyHttpApp,
    /// Present only when ACME staging is requested (spec.md §6
    /// `CHARON_ACME_STAGING`); otherwise the data plane's own default
    /// issuer (production Let's Encrypt) applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<CaddyTlsApp>,
}

/// ACME CA override, Caddy's `apps.tls.automation.policies[].issuers[]` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaddyTlsApp {
    pub automation: CaddyTlsAutomation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaddyTlsAutomation {
    pub policies: Vec<CaddyTlsPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaddyTlsPolicy {
    pub issuers: Vec<CaddyTlsIssuer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaddyTlsIssuer {
    pub module: String,
    pub ca: String,
}

pub const ACME_STAGING_DIRECTORY: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaddyHttpApp {
    /// Keyed by server name; emitted as a single `"manager"` server with
    /// one route per site (deterministic order — spec.md §4.1).
    pub servers: BTreeMap<String, CaddyServer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaddyServer {
    pub listen: Vec<String>,
    pub routes: Vec<CaddyRoute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaddyRoute {
    #[serde(rename = "match")]
    pub matchers: Vec<CaddyMatch>,
    pub handle: Vec<CaddyHandler>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaddyMatch {
    pub host: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
}

/// A handler entry. Real Caddy handlers are a tagged union on `"handler"`;
/// the projection engine only ever emits the three kinds listed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "handler")]
pub enum CaddyHandler {
    #[serde(rename = "reverse_proxy")]
    ReverseProxy { upstreams: Vec<CaddyUpstream> },
    #[serde(rename = "static_response")]
    StaticRedirect { status_code: u16, headers: BTreeMap<String, Vec<String>> },
    #[serde(rename = "coraza_waf")]
    CorazaWaf { rule_file: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaddyUpstream {
    pub dial: String,
}

impl CaddyConfig {
    /// Total number of routes across all servers, used by idempotence
    /// tests to sanity-check a round-trip snapshot.
    pub fn total_routes(&self) -> usize {
        self.apps.http.servers.values().map(|s| s.routes.len()).sum()
    }
}
