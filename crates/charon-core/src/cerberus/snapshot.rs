//! In-memory Cerberus snapshot, refreshed from the store on a poll/trigger
//! basis rather than read per-request — grounded on the reference crate's
//! `middleware::auth::auth_middleware_internal` reading an
//! `Arc<RwLock<ProxySecurityConfig>>` snapshot once per request instead of
//! touching the database on every call.

use crate::cerberus::waf::CompiledRuleSet;
use crate::store::Store;
use charon_types::{AccessList, SecurityConfig};
use ipnet::IpNet;

pub struct CerberusSnapshot {
    pub security: SecurityConfig,
    pub access_lists: Vec<AccessList>,
    pub admin_whitelist: Vec<IpNet>,
    pub active_ruleset: Option<CompiledRuleSet>,
}

impl Default for CerberusSnapshot {
    fn default() -> Self {
        Self {
            security: SecurityConfig::default(),
            access_lists: Vec::new(),
            admin_whitelist: Vec::new(),
            active_ruleset: None,
        }
    }
}

impl CerberusSnapshot {
    pub fn is_enabled(&self, runtime_toggle: bool) -> bool {
        self.security.cerberus_enabled(runtime_toggle)
    }
}

/// Parses a CSV of bare IPs/CIDRs, tolerating bare addresses as a /32 or
/// /128 host route.
pub fn parse_ip_list(csv: &str) -> Vec<IpNet> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|entry| {
            entry.parse::<IpNet>().ok().or_else(|| {
                entry.parse::<std::net::IpAddr>().ok().map(|ip| IpNet::new(ip, if ip.is_ipv4() { 32 } else { 128 }).unwrap())
            })
        })
        .collect()
}

pub async fn load(store: &Store) -> Result<CerberusSnapshot, sqlx::Error> {
    let security = store.security().get_config().await?;
    let access_lists = store.access_lists().list().await?;
    let rulesets = store.security().list_rulesets().await?;

    let admin_whitelist = parse_ip_list(&security.admin_whitelist);
    let active_ruleset = security
        .waf_rules_source
        .as_deref()
        .and_then(|name| rulesets.iter().find(|r| r.name == name))
        .map(CompiledRuleSet::compile);

    Ok(CerberusSnapshot { security, access_lists, admin_whitelist, active_ruleset })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_bare_ips_and_cidrs() {
        let nets = parse_ip_list("10.0.0.1, 192.168.0.0/16 , ::1");
        assert_eq!(nets.len(), 3);
    }

    #[test]
    fn blank_entries_are_ignored() {
        assert!(parse_ip_list(" , ,").is_empty());
    }
}
