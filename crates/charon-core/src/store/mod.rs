//! Postgres-backed persistence for every domain model.
//!
//! One `Store` wraps the pool; each entity gets its own submodule of free
//! functions taking `&PgPool` or `&mut PgConnection`, mirroring how the
//! teacher split account persistence into `account_pg_crud` /
//! `account_pg_query` rather than one God-object repository.

mod access_lists;
mod audit;
mod certificates;
mod notifications;
mod proxy_hosts;
mod security;
mod uptime;

pub use access_lists::AccessListStore;
pub use audit::{AuditEvent, AuditStore};
pub use certificates::CertificateStore;
pub use notifications::NotificationStore;
pub use proxy_hosts::ProxyHostStore;
pub use security::SecurityStore;
pub use uptime::UptimeStore;

use sqlx::PgPool;

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn proxy_hosts(&self) -> ProxyHostStore<'_> {
        ProxyHostStore::new(&self.pool)
    }

    pub fn access_lists(&self) -> AccessListStore<'_> {
        AccessListStore::new(&self.pool)
    }

    pub fn certificates(&self) -> CertificateStore<'_> {
        CertificateStore::new(&self.pool)
    }

    pub fn security(&self) -> SecurityStore<'_> {
        SecurityStore::new(&self.pool)
    }

    pub fn uptime(&self) -> UptimeStore<'_> {
        UptimeStore::new(&self.pool)
    }

    pub fn notifications(&self) -> NotificationStore<'_> {
        NotificationStore::new(&self.pool)
    }

    pub fn audit(&self) -> AuditStore<'_> {
        AuditStore::new(&self.pool)
    }

    /// Run the embedded SQL migrations against the configured database.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}
