//! Certificate reference model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateProvider {
    Letsencrypt,
    Custom,
}

impl CertificateProvider {
    /// Let's Encrypt certs are issued implicitly by the data plane and must
    /// never be attached by explicit reference (spec.md §3, §4.1 step 2).
    pub const fn is_implicit(self) -> bool {
        matches!(self, Self::Letsencrypt)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub uuid: Uuid,
    pub name: String,
    pub provider: CertificateProvider,
    pub domains: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}
