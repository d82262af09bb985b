//! Uptime monitor and heartbeat models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorType {
    Http,
    Https,
    Tcp,
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Up,
    Down,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeMonitor {
    pub uuid: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MonitorType,
    pub url: String,
    pub interval_seconds: u32,
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub last_state: MonitorState,
    #[serde(default)]
    pub last_latency_ms: Option<u32>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Set when this monitor was auto-derived from a `ProxyHost` (spec.md
    /// §3: 1:1, deleted when the host is deleted).
    #[serde(default)]
    pub proxy_host_uuid: Option<Uuid>,
    /// Consecutive failed checks observed in the current cycle, reset on
    /// any success. Drives the retry/state-transition rule in spec.md §4.3.
    #[serde(default)]
    pub consecutive_failures: u32,
}

const fn default_true() -> bool {
    true
}

impl UptimeMonitor {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_checked_at {
            None => true,
            Some(last) => {
                last + chrono::Duration::seconds(i64::from(self.interval_seconds)) <= now
            },
        }
    }

    /// Total deadline for a single check attempt: `min(interval, 10s)`
    /// (spec.md §4.3 per-check protocol).
    pub fn check_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.interval_seconds).min(10))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeHeartbeat {
    pub monitor_uuid: Uuid,
    pub status: HeartbeatStatus,
    pub latency_ms: Option<u32>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}
