//! Audit log persistence for security-relevant actions.

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// A single recorded action: config changes, Cerberus decisions,
/// break-glass usage. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub uuid: Uuid,
    pub action: String,
    pub actor: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub struct AuditStore<'a> {
    pool: &'a PgPool,
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<AuditEvent, sqlx::Error> {
    Ok(AuditEvent {
        uuid: row.try_get("uuid")?,
        action: row.try_get("action")?,
        actor: row.try_get("actor")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

impl<'a> AuditStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record an event outside of any enclosing transaction.
    pub async fn record(
        &self,
        action: &str,
        actor: Option<&str>,
        metadata: serde_json::Value,
    ) -> Result<AuditEvent, sqlx::Error> {
        let uuid = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO audit_events (uuid, action, actor, metadata) VALUES ($1, $2, $3, $4)",
        )
        .bind(uuid)
        .bind(action)
        .bind(actor)
        .bind(&metadata)
        .execute(self.pool)
        .await?;
        Ok(AuditEvent { uuid, action: action.to_string(), actor: actor.map(String::from), metadata, created_at: chrono::Utc::now() })
    }

    /// Record an event as part of an in-flight transaction, so it rolls
    /// back with whatever change it is documenting.
    pub async fn record_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        action: &str,
        actor: Option<&str>,
        metadata: serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO audit_events (uuid, action, actor, metadata) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(action)
        .bind(actor)
        .bind(metadata)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditEvent>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM audit_events ORDER BY created_at DESC LIMIT $1")
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        rows.iter().map(row_to_event).collect()
    }
}
