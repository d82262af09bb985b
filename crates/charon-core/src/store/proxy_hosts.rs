//! Proxy host persistence.

use charon_types::{ForwardScheme, Location, ProxyHost};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct ProxyHostStore<'a> {
    pool: &'a PgPool,
}

fn row_to_host(row: &sqlx::postgres::PgRow) -> Result<ProxyHost, sqlx::Error> {
    let domain_names_json: serde_json::Value = row.try_get("domain_names")?;
    let domain_names: Vec<String> = serde_json::from_value(domain_names_json)
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
    let scheme_str: String = row.try_get("forward_scheme")?;
    let preset_str: String = row.try_get("application_preset")?;

    Ok(ProxyHost {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        domain_names,
        forward_scheme: if scheme_str == "https" { ForwardScheme::Https } else { ForwardScheme::Http },
        forward_host: row.try_get("forward_host")?,
        forward_port: u16::try_from(row.try_get::<i32, _>("forward_port")?).unwrap_or(80),
        ssl_forced: row.try_get("ssl_forced")?,
        http2_support: row.try_get("http2_support")?,
        hsts_enabled: row.try_get("hsts_enabled")?,
        hsts_subdomains: row.try_get("hsts_subdomains")?,
        block_exploits: row.try_get("block_exploits")?,
        websocket_support: row.try_get("websocket_support")?,
        enabled: row.try_get("enabled")?,
        application_preset: serde_json::from_value(serde_json::Value::String(preset_str))
            .unwrap_or_default(),
        advanced_config: row.try_get("advanced_config")?,
        certificate_id: row.try_get("certificate_id")?,
        access_list_id: row.try_get("access_list_id")?,
        forward_auth_policy_id: row.try_get("forward_auth_policy_id")?,
        locations: Vec::new(),
    })
}

impl<'a> ProxyHostStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<ProxyHost>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM proxy_hosts ORDER BY name").fetch_all(self.pool).await?;
        let mut hosts = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut host = row_to_host(row)?;
            host.locations = self.locations_for(host.uuid).await?;
            hosts.push(host);
        }
        Ok(hosts)
    }

    pub async fn get(&self, uuid: Uuid) -> Result<Option<ProxyHost>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM proxy_hosts WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(self.pool)
            .await?;
        match row {
            Some(row) => {
                let mut host = row_to_host(&row)?;
                host.locations = self.locations_for(uuid).await?;
                Ok(Some(host))
            },
            None => Ok(None),
        }
    }

    async fn locations_for(&self, host_uuid: Uuid) -> Result<Vec<Location>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM proxy_host_locations WHERE proxy_host_uuid = $1 ORDER BY path")
            .bind(host_uuid)
            .fetch_all(self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let scheme_str: String = row.try_get("forward_scheme")?;
                Ok(Location {
                    uuid: row.try_get("uuid")?,
                    path: row.try_get("path")?,
                    forward_scheme: if scheme_str == "https" {
                        ForwardScheme::Https
                    } else {
                        ForwardScheme::Http
                    },
                    forward_host: row.try_get("forward_host")?,
                    forward_port: u16::try_from(row.try_get::<i32, _>("forward_port")?).unwrap_or(80),
                    advanced_config: row.try_get("advanced_config")?,
                })
            })
            .collect()
    }

    pub async fn upsert(&self, host: &ProxyHost) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let domain_names_json = serde_json::to_value(&host.domain_names)
            .map_err(|err| sqlx::Error::Encode(Box::new(err)))?;
        let scheme_str = match host.forward_scheme {
            ForwardScheme::Http => "http",
            ForwardScheme::Https => "https",
        };
        let preset_str =
            serde_json::to_value(host.application_preset).ok().and_then(|v| v.as_str().map(String::from))
                .unwrap_or_else(|| "none".to_string());

        sqlx::query(
            r#"INSERT INTO proxy_hosts
                (uuid, name, domain_names, forward_scheme, forward_host, forward_port,
                 ssl_forced, http2_support, hsts_enabled, hsts_subdomains, block_exploits,
                 websocket_support, enabled, application_preset, advanced_config,
                 certificate_id, access_list_id, forward_auth_policy_id)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)
               ON CONFLICT (uuid) DO UPDATE SET
                 name = EXCLUDED.name, domain_names = EXCLUDED.domain_names,
                 forward_scheme = EXCLUDED.forward_scheme, forward_host = EXCLUDED.forward_host,
                 forward_port = EXCLUDED.forward_port, ssl_forced = EXCLUDED.ssl_forced,
                 http2_support = EXCLUDED.http2_support, hsts_enabled = EXCLUDED.hsts_enabled,
                 hsts_subdomains = EXCLUDED.hsts_subdomains, block_exploits = EXCLUDED.block_exploits,
                 websocket_support = EXCLUDED.websocket_support, enabled = EXCLUDED.enabled,
                 application_preset = EXCLUDED.application_preset,
                 advanced_config = EXCLUDED.advanced_config, certificate_id = EXCLUDED.certificate_id,
                 access_list_id = EXCLUDED.access_list_id,
                 forward_auth_policy_id = EXCLUDED.forward_auth_policy_id"#,
        )
        .bind(host.uuid)
        .bind(&host.name)
        .bind(domain_names_json)
        .bind(scheme_str)
        .bind(&host.forward_host)
        .bind(i32::from(host.forward_port))
        .bind(host.ssl_forced)
        .bind(host.http2_support)
        .bind(host.hsts_enabled)
        .bind(host.hsts_subdomains)
        .bind(host.block_exploits)
        .bind(host.websocket_support)
        .bind(host.enabled)
        .bind(preset_str)
        .bind(&host.advanced_config)
        .bind(host.certificate_id)
        .bind(host.access_list_id)
        .bind(host.forward_auth_policy_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM proxy_host_locations WHERE proxy_host_uuid = $1")
            .bind(host.uuid)
            .execute(&mut *tx)
            .await?;

        for location in &host.locations {
            let loc_scheme = match location.forward_scheme {
                ForwardScheme::Http => "http",
                ForwardScheme::Https => "https",
            };
            sqlx::query(
                r#"INSERT INTO proxy_host_locations
                    (uuid, proxy_host_uuid, path, forward_scheme, forward_host, forward_port, advanced_config)
                   VALUES ($1,$2,$3,$4,$5,$6,$7)"#,
            )
            .bind(location.uuid)
            .bind(host.uuid)
            .bind(&location.path)
            .bind(loc_scheme)
            .bind(&location.forward_host)
            .bind(i32::from(location.forward_port))
            .bind(&location.advanced_config)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }

    pub async fn delete(&self, uuid: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM proxy_hosts WHERE uuid = $1").bind(uuid).execute(self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bulk-assign an access list across a set of hosts. Partial
    /// failures (unknown host uuids) are reported to the caller instead
    /// of aborting the whole batch (spec.md §6 bulk ACL endpoint); an
    /// unknown uuid is a 0-row update, not an error, so it never rolls
    /// back the hosts that did match.
    pub async fn bulk_set_access_list(
        &self,
        host_uuids: &[Uuid],
        access_list_id: Option<Uuid>,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut updated = Vec::with_capacity(host_uuids.len());
        for &uuid in host_uuids {
            let result = sqlx::query("UPDATE proxy_hosts SET access_list_id = $2 WHERE uuid = $1")
                .bind(uuid)
                .bind(access_list_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() > 0 {
                updated.push(uuid);
            }
        }
        tx.commit().await?;
        Ok(updated)
    }
}
