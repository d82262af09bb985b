//! Core domain models shared across the manager workspace.

mod access_list;
mod certificate;
mod notification;
mod proxy_host;
mod security;
mod uptime;

pub use access_list::{AccessDecision, AccessList, AccessListType, IpRule};
pub use certificate::{Certificate, CertificateProvider};
pub use notification::{NotificationEvent, NotificationKind, NotificationProvider};
pub use proxy_host::{ApplicationPreset, ForwardScheme, Location, ProxyHost};
pub use security::{
    AclMode, BreakGlassToken, CrowdsecMode, RateLimitMode, RuleSetMode, SecurityConfig,
    SecurityRuleSet, WafMode,
};
pub use uptime::{HeartbeatStatus, MonitorState, MonitorType, UptimeHeartbeat, UptimeMonitor};
