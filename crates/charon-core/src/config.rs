//! Environment-driven runtime configuration.
//!
//! Every setting accepts a `CHARON_*` variable; `CPM_*` is read as a
//! legacy fallback so operators migrating an existing deployment are not
//! forced to rename everything in one pass. Names follow the reverse-proxy
//! manager's own convention (`CHARON_CADDY_ADMIN_API`, `CHARON_HTTP_PORT`,
//! ...) rather than the teacher's AI-proxy env vars.

use charon_types::WafMode;
use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

fn env_var(primary: &str, legacy: &str) -> Option<String> {
    std::env::var(primary).ok().or_else(|| std::env::var(legacy).ok())
}

fn env_or<T: std::str::FromStr>(primary: &str, legacy: &str, default: T) -> T {
    env_var(primary, legacy).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    /// The data-plane's admin API base URL (`CHARON_CADDY_ADMIN_API`).
    pub data_plane_admin_url: String,
    /// Directory the data plane reads its config from; the Manager stages
    /// WAF rulesets under `<this>/coraza/rulesets/` (spec.md §6 filesystem
    /// layout).
    pub caddy_config_dir: PathBuf,
    /// Pass-through flag for the data plane's ACME directory selection.
    /// Charon Manager does not itself speak ACME; this is carried so the
    /// projected config can pick the staging directory when set.
    pub acme_staging: bool,
    /// Seeds `security_config.waf_mode` on every boot when set, letting an
    /// operator pin the WAF mode via the environment instead of the API.
    pub initial_waf_mode: Option<WafMode>,
    /// Days of uptime heartbeats retained before the daily prune task
    /// removes them (spec.md §4.3 Open Question, resolved in SPEC_FULL.md).
    pub heartbeat_retention_days: i64,
    /// CIDRs allowed to set `X-Forwarded-For` for Cerberus's client-IP
    /// resolution (spec.md §4.2); empty means every peer is authoritative.
    pub trusted_proxies: Vec<IpNet>,
    pub log_json: bool,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = Self::resolve_bind_addr()?;

        let database_url = env_var("CHARON_DATABASE_URL", "CPM_DATABASE_URL")
            .or_else(|| env_var("CHARON_DB_PATH", "CPM_DB_PATH"))
            .ok_or_else(|| anyhow::anyhow!("CHARON_DATABASE_URL is required"))?;

        let data_plane_admin_url = env_var("CHARON_CADDY_ADMIN_API", "CPM_CADDY_ADMIN_API")
            .or_else(|| env_var("CHARON_DATA_PLANE_ADMIN_URL", "CPM_DATA_PLANE_ADMIN_URL"))
            .unwrap_or_else(|| "http://127.0.0.1:2019".to_string());

        let caddy_config_dir: PathBuf = env_var("CHARON_CADDY_CONFIG_DIR", "CPM_CADDY_CONFIG_DIR")
            .unwrap_or_else(|| "./data/caddy".to_string())
            .into();

        let acme_staging = env_var("CHARON_ACME_STAGING", "CPM_ACME_STAGING")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let initial_waf_mode = env_var("CHARON_SECURITY_WAF_MODE", "CPM_SECURITY_WAF_MODE")
            .map(|v| match v.to_ascii_lowercase().as_str() {
                "block" => Ok(WafMode::Block),
                "monitor" => Ok(WafMode::Monitor),
                "disabled" => Ok(WafMode::Disabled),
                other => Err(anyhow::anyhow!("invalid CHARON_SECURITY_WAF_MODE: {other}")),
            })
            .transpose()?;

        let heartbeat_retention_days: i64 =
            env_or("CHARON_HEARTBEAT_RETENTION_DAYS", "CPM_HEARTBEAT_RETENTION_DAYS", 30);

        let log_json = env_var("CHARON_LOG_JSON", "CPM_LOG_JSON")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let trusted_proxies = env_var("CHARON_TRUSTED_PROXIES", "CPM_TRUSTED_PROXIES")
            .map(|csv| csv.split(',').map(str::trim).filter(|s| !s.is_empty()).filter_map(|s| s.parse().ok()).collect())
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            database_url,
            data_plane_admin_url,
            caddy_config_dir,
            acme_staging,
            initial_waf_mode,
            heartbeat_retention_days,
            trusted_proxies,
            log_json,
        })
    }

    /// `CHARON_BIND_ADDR` wins if set (full `host:port`); otherwise
    /// `CHARON_HTTP_PORT` (spec.md §6's literal var) selects the port on
    /// `0.0.0.0`, defaulting to 8080.
    fn resolve_bind_addr() -> anyhow::Result<SocketAddr> {
        if let Some(addr) = env_var("CHARON_BIND_ADDR", "CPM_BIND_ADDR") {
            return addr.parse().map_err(|err| anyhow::anyhow!("invalid CHARON_BIND_ADDR: {err}"));
        }
        let port: u16 = env_or("CHARON_HTTP_PORT", "CPM_HTTP_PORT", 8080);
        Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
    }

    pub fn heartbeat_retention(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.heartbeat_retention_days.max(0)).unwrap_or(0) * 86400)
    }

    /// `<caddy_config_dir>/coraza/rulesets` — the Manager-owned staging
    /// directory for WAF ruleset files (spec.md §6 filesystem layout).
    pub fn rulesets_dir(&self) -> PathBuf {
        self.caddy_config_dir.join("coraza").join("rulesets")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rulesets_dir_nests_under_caddy_config_dir() {
        let settings = Settings {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            database_url: "postgres://x".to_string(),
            data_plane_admin_url: "http://127.0.0.1:2019".to_string(),
            caddy_config_dir: PathBuf::from("/data/caddy"),
            acme_staging: false,
            initial_waf_mode: None,
            heartbeat_retention_days: 30,
            trusted_proxies: Vec::new(),
            log_json: false,
        };
        assert_eq!(settings.rulesets_dir(), PathBuf::from("/data/caddy/coraza/rulesets"));
    }
}
