//! Notification provider subscription persistence.

use charon_types::NotificationProvider;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct NotificationStore<'a> {
    pool: &'a PgPool,
}

impl<'a> NotificationStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_enabled(&self) -> Result<Vec<NotificationProvider>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM notification_providers WHERE enabled ORDER BY name")
            .fetch_all(self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(NotificationProvider {
                    uuid: row.try_get("uuid")?,
                    name: row.try_get("name")?,
                    transport: row.try_get("transport")?,
                    notify_uptime: row.try_get("notify_uptime")?,
                    notify_certs: row.try_get("notify_certs")?,
                    enabled: row.try_get("enabled")?,
                })
            })
            .collect()
    }

    pub async fn upsert(&self, provider: &NotificationProvider) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO notification_providers (uuid, name, transport, notify_uptime, notify_certs, enabled)
               VALUES ($1,$2,$3,$4,$5,$6)
               ON CONFLICT (uuid) DO UPDATE SET
                 name = EXCLUDED.name, transport = EXCLUDED.transport,
                 notify_uptime = EXCLUDED.notify_uptime, notify_certs = EXCLUDED.notify_certs,
                 enabled = EXCLUDED.enabled"#,
        )
        .bind(provider.uuid)
        .bind(&provider.name)
        .bind(&provider.transport)
        .bind(provider.notify_uptime)
        .bind(provider.notify_certs)
        .bind(provider.enabled)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, uuid: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notification_providers WHERE uuid = $1")
            .bind(uuid)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
