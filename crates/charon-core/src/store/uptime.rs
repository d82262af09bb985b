//! Uptime monitor and heartbeat persistence.

use charon_types::{HeartbeatStatus, MonitorState, MonitorType, UptimeHeartbeat, UptimeMonitor};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct UptimeStore<'a> {
    pool: &'a PgPool,
}

fn row_to_monitor(row: &sqlx::postgres::PgRow) -> Result<UptimeMonitor, sqlx::Error> {
    let kind_str: String = row.try_get("kind")?;
    let state_str: String = row.try_get("last_state")?;
    Ok(UptimeMonitor {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        kind: match kind_str.as_str() {
            "https" => MonitorType::Https,
            "tcp" => MonitorType::Tcp,
            "ping" => MonitorType::Ping,
            _ => MonitorType::Http,
        },
        url: row.try_get("url")?,
        interval_seconds: u32::try_from(row.try_get::<i32, _>("interval_seconds")?).unwrap_or(60),
        max_retries: u32::try_from(row.try_get::<i32, _>("max_retries")?).unwrap_or(3),
        enabled: row.try_get("enabled")?,
        last_state: match state_str.as_str() {
            "up" => MonitorState::Up,
            "down" => MonitorState::Down,
            _ => MonitorState::Unknown,
        },
        last_latency_ms: row
            .try_get::<Option<i32>, _>("last_latency_ms")?
            .map(|v| u32::try_from(v).unwrap_or(0)),
        last_checked_at: row.try_get("last_checked_at")?,
        proxy_host_uuid: row.try_get("proxy_host_uuid")?,
        consecutive_failures: u32::try_from(row.try_get::<i32, _>("consecutive_failures")?).unwrap_or(0),
    })
}

impl<'a> UptimeStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<UptimeMonitor>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM uptime_monitors ORDER BY name").fetch_all(self.pool).await?;
        rows.iter().map(row_to_monitor).collect()
    }

    pub async fn list_due(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<UptimeMonitor>, sqlx::Error> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|m| m.enabled && m.is_due(now))
            .collect())
    }

    pub async fn get(&self, uuid: Uuid) -> Result<Option<UptimeMonitor>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM uptime_monitors WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(row_to_monitor).transpose()
    }

    pub async fn upsert(&self, monitor: &UptimeMonitor) -> Result<(), sqlx::Error> {
        let kind_str = match monitor.kind {
            MonitorType::Http => "http",
            MonitorType::Https => "https",
            MonitorType::Tcp => "tcp",
            MonitorType::Ping => "ping",
        };
        let state_str = match monitor.last_state {
            MonitorState::Up => "up",
            MonitorState::Down => "down",
            MonitorState::Unknown => "unknown",
        };
        sqlx::query(
            r#"INSERT INTO uptime_monitors
                (uuid, name, kind, url, interval_seconds, max_retries, enabled, last_state,
                 last_latency_ms, last_checked_at, proxy_host_uuid, consecutive_failures)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
               ON CONFLICT (uuid) DO UPDATE SET
                 name = EXCLUDED.name, kind = EXCLUDED.kind, url = EXCLUDED.url,
                 interval_seconds = EXCLUDED.interval_seconds, max_retries = EXCLUDED.max_retries,
                 enabled = EXCLUDED.enabled, last_state = EXCLUDED.last_state,
                 last_latency_ms = EXCLUDED.last_latency_ms, last_checked_at = EXCLUDED.last_checked_at,
                 proxy_host_uuid = EXCLUDED.proxy_host_uuid,
                 consecutive_failures = EXCLUDED.consecutive_failures"#,
        )
        .bind(monitor.uuid)
        .bind(&monitor.name)
        .bind(kind_str)
        .bind(&monitor.url)
        .bind(i32::try_from(monitor.interval_seconds).unwrap_or(60))
        .bind(i32::try_from(monitor.max_retries).unwrap_or(3))
        .bind(monitor.enabled)
        .bind(state_str)
        .bind(monitor.last_latency_ms.map(|v| i32::try_from(v).unwrap_or(i32::MAX)))
        .bind(monitor.last_checked_at)
        .bind(monitor.proxy_host_uuid)
        .bind(i32::try_from(monitor.consecutive_failures).unwrap_or(i32::MAX))
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, uuid: Uuid) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM uptime_monitors WHERE uuid = $1").bind(uuid).execute(self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_by_proxy_host(&self, proxy_host_uuid: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM uptime_monitors WHERE proxy_host_uuid = $1")
            .bind(proxy_host_uuid)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Persists a check outcome: the heartbeat row and the monitor's
    /// `last_state`/`last_latency_ms`/`last_checked_at`/`consecutive_failures`
    /// columns update in the same transaction (spec.md §4.3 persistence).
    pub async fn record_result(
        &self,
        monitor_uuid: Uuid,
        heartbeat: &UptimeHeartbeat,
        last_state: MonitorState,
        consecutive_failures: u32,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let status_str = match heartbeat.status {
            HeartbeatStatus::Up => "up",
            HeartbeatStatus::Down => "down",
        };
        sqlx::query(
            r#"INSERT INTO uptime_heartbeats (monitor_uuid, status, latency_ms, message, created_at)
               VALUES ($1,$2,$3,$4,$5)"#,
        )
        .bind(heartbeat.monitor_uuid)
        .bind(status_str)
        .bind(heartbeat.latency_ms.map(|v| i32::try_from(v).unwrap_or(i32::MAX)))
        .bind(&heartbeat.message)
        .bind(heartbeat.created_at)
        .execute(&mut *tx)
        .await?;

        let state_str = match last_state {
            MonitorState::Up => "up",
            MonitorState::Down => "down",
            MonitorState::Unknown => "unknown",
        };
        sqlx::query(
            r#"UPDATE uptime_monitors
                 SET last_state = $1, last_latency_ms = $2, last_checked_at = $3, consecutive_failures = $4
               WHERE uuid = $5"#,
        )
        .bind(state_str)
        .bind(heartbeat.latency_ms.map(|v| i32::try_from(v).unwrap_or(i32::MAX)))
        .bind(heartbeat.created_at)
        .bind(i32::try_from(consecutive_failures).unwrap_or(i32::MAX))
        .bind(monitor_uuid)
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }

    pub async fn record_heartbeat(&self, heartbeat: &UptimeHeartbeat) -> Result<(), sqlx::Error> {
        let status_str = match heartbeat.status {
            HeartbeatStatus::Up => "up",
            HeartbeatStatus::Down => "down",
        };
        sqlx::query(
            r#"INSERT INTO uptime_heartbeats (monitor_uuid, status, latency_ms, message, created_at)
               VALUES ($1,$2,$3,$4,$5)"#,
        )
        .bind(heartbeat.monitor_uuid)
        .bind(status_str)
        .bind(heartbeat.latency_ms.map(|v| i32::try_from(v).unwrap_or(i32::MAX)))
        .bind(&heartbeat.message)
        .bind(heartbeat.created_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn heartbeats(&self, monitor_uuid: Uuid, limit: i64) -> Result<Vec<UptimeHeartbeat>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM uptime_heartbeats WHERE monitor_uuid = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(monitor_uuid)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let status_str: String = row.try_get("status")?;
                Ok(UptimeHeartbeat {
                    monitor_uuid: row.try_get("monitor_uuid")?,
                    status: if status_str == "up" { HeartbeatStatus::Up } else { HeartbeatStatus::Down },
                    latency_ms: row
                        .try_get::<Option<i32>, _>("latency_ms")?
                        .map(|v| u32::try_from(v).unwrap_or(0)),
                    message: row.try_get("message")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    /// Prune heartbeats older than the retention window (spec.md §4.3
    /// Open Question, resolved as a daily background task).
    pub async fn prune_heartbeats_older_than(
        &self,
        retention: std::time::Duration,
    ) -> Result<u64, sqlx::Error> {
        let days = retention.as_secs() / 86400;
        let result = sqlx::query(
            "DELETE FROM uptime_heartbeats WHERE created_at < NOW() - ($1 || ' days')::interval",
        )
        .bind(days.to_string())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
