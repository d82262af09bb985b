//! Proxy host and location models.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Forward scheme used when contacting the upstream target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardScheme {
    Http,
    Https,
}

impl Default for ForwardScheme {
    fn default() -> Self {
        Self::Http
    }
}

/// Vendor application preset, used by the UI/API layer to pre-fill
/// location overrides. The projection engine treats this as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationPreset {
    #[default]
    None,
    Plex,
    Jellyfin,
    Emby,
    Homeassistant,
    Nextcloud,
    Vaultwarden,
}

/// A path-prefix override under a `ProxyHost`, owned exclusively by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub uuid: Uuid,
    pub path: String,
    pub forward_scheme: ForwardScheme,
    pub forward_host: String,
    pub forward_port: u16,
    #[serde(default)]
    pub advanced_config: Option<String>,
}

/// A declarative virtual-host routing rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyHost {
    pub uuid: Uuid,
    pub name: String,
    /// CSV on the wire; kept as a parsed vector internally.
    pub domain_names: Vec<String>,
    pub forward_scheme: ForwardScheme,
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
    pub locations: Vec<Location>,
}

const fn default_true() -> bool {
    true
}

impl ProxyHost {
    /// First domain name, used as the default uptime-monitor target and
    /// for stable sort keys.
    pub fn primary_domain(&self) -> Option<&str> {
        self.domain_names.first().map(String::as_str)
    }

    pub fn forward_target_url(&self) -> String {
        format!(
            "{}://{}:{}",
            match self.forward_scheme {
                ForwardScheme::Http => "http",
                ForwardScheme::Https => "https",
            },
            self.forward_host,
            self.forward_port
        )
    }
}
