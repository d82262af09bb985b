//! WAF ruleset and global security configuration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSetMode {
    Blocking,
    Detection,
}

impl RuleSetMode {
    /// The ModSecurity/Coraza-style engine directive emitted into the
    /// staged ruleset file header (spec.md §4.1 step 4).
    pub const fn engine_directive(self) -> &'static str {
        match self {
            Self::Blocking => "SecRuleEngine On",
            Self::Detection => "SecRuleEngine DetectionOnly",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityRuleSet {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub source_url: Option<String>,
    pub mode: RuleSetMode,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WafMode {
    #[default]
    Disabled,
    Monitor,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AclMode {
    #[default]
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitMode {
    #[default]
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrowdsecMode {
    #[default]
    Disabled,
    Local,
    Cloud,
}

/// Singleton security configuration. One row ever exists in the store
/// (spec.md §3 invariant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub enabled: bool,
    /// CSV of IP/CIDR entries that bypass all Cerberus checks.
    #[serde(default)]
    pub admin_whitelist: String,
    #[serde(default)]
    pub waf_mode: WafMode,
    #[serde(default)]
    pub waf_rules_source: Option<String>,
    #[serde(default)]
    pub acl_mode: AclMode,
    #[serde(default)]
    pub rate_limit_mode: RateLimitMode,
    #[serde(default)]
    pub rate_limit_requests_per_minute: Option<u32>,
    #[serde(default)]
    pub crowdsec_mode: CrowdsecMode,
    #[serde(default)]
    pub crowdsec_api_url: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            admin_whitelist: String::new(),
            waf_mode: WafMode::Disabled,
            waf_rules_source: None,
            acl_mode: AclMode::Disabled,
            rate_limit_mode: RateLimitMode::Disabled,
            rate_limit_requests_per_minute: None,
            crowdsec_mode: CrowdsecMode::Disabled,
            crowdsec_api_url: None,
        }
    }
}

impl SecurityConfig {
    /// Parsed, non-empty admin whitelist entries.
    pub fn admin_whitelist_entries(&self) -> Vec<&str> {
        self.admin_whitelist.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
    }

    /// spec.md §3 invariant: enabling with `waf_mode=block` requires a
    /// non-empty admin whitelist. The break-glass exemption is checked by
    /// the caller, since it requires a live token lookup.
    pub fn has_admin_whitelist(&self) -> bool {
        !self.admin_whitelist_entries().is_empty()
    }

    /// spec.md §4.2 enablement rule.
    pub fn cerberus_enabled(&self, runtime_toggle: bool) -> bool {
        self.enabled
            || self.waf_mode != WafMode::Disabled
            || self.acl_mode == AclMode::Enabled
            || self.rate_limit_mode == RateLimitMode::Enabled
            || self.crowdsec_mode == CrowdsecMode::Local
            || runtime_toggle
    }
}

/// One-shot credential that permits disabling security when the operator
/// would otherwise be locked out. Stored hashed; never round-tripped in
/// plaintext after issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakGlassToken {
    pub uuid: Uuid,
    pub token_hash: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub used_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl BreakGlassToken {
    pub fn is_valid(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}
