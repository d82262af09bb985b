//! Notification provider subscriptions and events.
//!
//! The outbound transports themselves (SMTP/webhook/chat) are external
//! collaborators (spec.md §1); this module models only the subscription
//! record and the event shape dispatched to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationProvider {
    pub uuid: Uuid,
    pub name: String,
    /// Opaque transport identifier understood by the (external) dispatch
    /// layer, e.g. "webhook", "smtp", "slack".
    pub transport: String,
    #[serde(default)]
    pub notify_uptime: bool,
    #[serde(default)]
    pub notify_certs: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Uptime,
    Certs,
    Applyfailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    #[serde(default)]
    pub monitor_uuid: Option<Uuid>,
    #[serde(default)]
    pub old_state: Option<String>,
    #[serde(default)]
    pub new_state: Option<String>,
    pub at: DateTime<Utc>,
    pub message: String,
}
