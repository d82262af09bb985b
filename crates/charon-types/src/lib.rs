//! # charon-types
//!
//! Foundational, framework-agnostic types for the Charon reverse-proxy
//! manager:
//!
//! - **`models`** - domain models (proxy hosts, access lists, certificates,
//!   security config, uptime monitors, notifications)
//! - **`dataplane`** - JSON document shapes understood by the Caddy-like
//!   data-plane admin API
//! - **`error`** - parse/validation error kinds detectable without a store
//!   or HTTP context
//!
//! ## Architecture role
//!
//! `charon-types` sits at the bottom of the dependency graph:
//!
//! ```text
//!                  charon-types (this crate)
//!                         │
//!            ┌────────────┴────────────┐
//!            ▼                         ▼
//!      charon-core              charon-admin-client
//!            │                         │
//!            └────────────┬────────────┘
//!                          ▼
//!                    charon-server
//! ```
//!
//! All types are serde-serializable, `Clone`, and `PartialEq` so they can
//! cross async boundaries and be asserted against directly in tests.

pub mod dataplane;
pub mod error;
pub mod models;

pub use error::DomainError;

pub use models::{
    AccessDecision, AccessList, AccessListType, AclMode, ApplicationPreset, BreakGlassToken,
    Certificate, CertificateProvider, CrowdsecMode, ForwardScheme, HeartbeatStatus, IpRule,
    Location, MonitorState, MonitorType, NotificationEvent, NotificationKind,
    NotificationProvider, ProxyHost, RateLimitMode, RuleSetMode, SecurityConfig, SecurityRuleSet,
    UptimeHeartbeat, UptimeMonitor, WafMode,
};
