//! Access control list model: IP/CIDR and geo allow/deny rules.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessListType {
    Whitelist,
    Blacklist,
    GeoWhitelist,
    GeoBlacklist,
    LocalOnly,
}

/// A single CIDR rule with an operator-facing description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRule {
    pub cidr: String,
    #[serde(default)]
    pub description: String,
}

impl IpRule {
    /// Parse and validate the CIDR literal. Called at write-time so that
    /// invalid CIDRs never reach the store (spec.md §3 invariant).
    pub fn parse(&self) -> Result<IpNet, DomainError> {
        self.cidr
            .parse::<IpNet>()
            .map_err(|_| DomainError::InvalidCidr(self.cidr.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessList {
    pub uuid: Uuid,
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

/// Well-known private/loopback ranges used by the `local_only` ACL kind.
fn is_local_network(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || ((v6.segments()[0] & 0xfe00) == 0xfc00) // ULA fc00::/7
        },
    }
}

/// Outcome of evaluating a single ACL against a client IP. Country-based
/// decisions defer to an external GeoIP lookup (spec.md §4.2 — out of
/// scope interface) via `country` being pre-resolved by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny,
}

impl AccessList {
    /// Evaluate the list-type-specific rule set described in spec.md §4.2.
    /// `country` is the caller-resolved ISO-3166 alpha-2 code for `ip`,
    /// when known; required only for the geo variants.
    pub fn test_ip(&self, ip: IpAddr, country: Option<&str>) -> AccessDecision {
        match self.kind {
            AccessListType::Whitelist => {
                if self.ip_in_list(ip) {
                    AccessDecision::Allow
                } else {
                    AccessDecision::Deny
                }
            },
            AccessListType::Blacklist => {
                if self.ip_in_list(ip) {
                    AccessDecision::Deny
                } else {
                    AccessDecision::Allow
                }
            },
            AccessListType::GeoWhitelist => match country {
                Some(cc) if self.country_codes.iter().any(|c| c.eq_ignore_ascii_case(cc)) => {
                    AccessDecision::Allow
                },
                _ => AccessDecision::Deny,
            },
            AccessListType::GeoBlacklist => match country {
                Some(cc) if self.country_codes.iter().any(|c| c.eq_ignore_ascii_case(cc)) => {
                    AccessDecision::Deny
                },
                _ => AccessDecision::Allow,
            },
            AccessListType::LocalOnly => {
                if is_local_network(ip) {
                    AccessDecision::Allow
                } else {
                    AccessDecision::Deny
                }
            },
        }
    }

    fn ip_in_list(&self, ip: IpAddr) -> bool {
        self.ip_rules.iter().any(|rule| rule.parse().is_ok_and(|net| net.contains(&ip)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(kind: AccessListType, cidrs: &[&str]) -> AccessList {
        AccessList {
            uuid: Uuid::new_v4(),
            name: "test".into(),
            kind,
            ip_rules: cidrs
                .iter()
                .map(|c| IpRule { cidr: (*c).to_string(), description: String::new() })
                .collect(),
            country_codes: vec![],
            local_network_only: false,
            enabled: true,
        }
    }

    #[test]
    fn whitelist_allows_listed_ip_only() {
        let acl = list(AccessListType::Whitelist, &["10.0.0.0/8"]);
        assert_eq!(acl.test_ip("10.1.2.3".parse().unwrap(), None), AccessDecision::Allow);
        assert_eq!(acl.test_ip("8.8.8.8".parse().unwrap(), None), AccessDecision::Deny);
    }

    #[test]
    fn blacklist_denies_listed_ip_only() {
        let acl = list(AccessListType::Blacklist, &["1.2.3.0/24"]);
        assert_eq!(acl.test_ip("1.2.3.4".parse().unwrap(), None), AccessDecision::Deny);
        assert_eq!(acl.test_ip("9.9.9.9".parse().unwrap(), None), AccessDecision::Allow);
    }

    #[test]
    fn local_only_allows_private_ranges() {
        let acl = list(AccessListType::LocalOnly, &[]);
        assert_eq!(acl.test_ip("192.168.1.5".parse().unwrap(), None), AccessDecision::Allow);
        assert_eq!(acl.test_ip("127.0.0.1".parse().unwrap(), None), AccessDecision::Allow);
        assert_eq!(acl.test_ip("203.0.113.4".parse().unwrap(), None), AccessDecision::Deny);
    }

    #[test]
    fn geo_whitelist_requires_matching_country() {
        let mut acl = list(AccessListType::GeoWhitelist, &[]);
        acl.country_codes = vec!["US".into(), "CA".into()];
        assert_eq!(acl.test_ip("1.1.1.1".parse().unwrap(), Some("US")), AccessDecision::Allow);
        assert_eq!(acl.test_ip("1.1.1.1".parse().unwrap(), Some("FR")), AccessDecision::Deny);
        assert_eq!(acl.test_ip("1.1.1.1".parse().unwrap(), None), AccessDecision::Deny);
    }

    #[test]
    fn invalid_cidr_is_rejected_at_parse_time() {
        let rule = IpRule { cidr: "not-a-cidr".into(), description: String::new() };
        assert!(rule.parse().is_err());
    }
}
