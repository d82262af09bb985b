//! Certificate reference persistence.

use charon_types::{Certificate, CertificateProvider};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct CertificateStore<'a> {
    pool: &'a PgPool,
}

fn row_to_cert(row: &sqlx::postgres::PgRow) -> Result<Certificate, sqlx::Error> {
    let provider_str: String = row.try_get("provider")?;
    let domains_json: serde_json::Value = row.try_get("domains")?;
    let domains: Vec<String> =
        serde_json::from_value(domains_json).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

    Ok(Certificate {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        provider: if provider_str == "custom" { CertificateProvider::Custom } else { CertificateProvider::Letsencrypt },
        domains,
        expires_at: row.try_get("expires_at")?,
    })
}

impl<'a> CertificateStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Certificate>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM certificates ORDER BY name").fetch_all(self.pool).await?;
        rows.iter().map(row_to_cert).collect()
    }

    pub async fn get(&self, uuid: Uuid) -> Result<Option<Certificate>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM certificates WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(row_to_cert).transpose()
    }

    /// Certificates expiring within `within_days`, used by the startup
    /// scrub and the certificate-expiry notification sweep.
    pub async fn expiring_within(&self, within_days: i64) -> Result<Vec<Certificate>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM certificates WHERE provider = 'custom' AND expires_at IS NOT NULL \
             AND expires_at <= NOW() + ($1 || ' days')::interval ORDER BY expires_at",
        )
        .bind(within_days.to_string())
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(row_to_cert).collect()
    }

    pub async fn upsert(&self, cert: &Certificate) -> Result<(), sqlx::Error> {
        let provider_str = match cert.provider {
            CertificateProvider::Letsencrypt => "letsencrypt",
            CertificateProvider::Custom => "custom",
        };
        let domains_json =
            serde_json::to_value(&cert.domains).map_err(|err| sqlx::Error::Encode(Box::new(err)))?;

        sqlx::query(
            r#"INSERT INTO certificates (uuid, name, provider, domains, expires_at)
               VALUES ($1,$2,$3,$4,$5)
               ON CONFLICT (uuid) DO UPDATE SET
                 name = EXCLUDED.name, provider = EXCLUDED.provider,
                 domains = EXCLUDED.domains, expires_at = EXCLUDED.expires_at"#,
        )
        .bind(cert.uuid)
        .bind(provider_str)
        .bind(domains_json)
        .bind(cert.expires_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, uuid: Uuid) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM certificates WHERE uuid = $1").bind(uuid).execute(self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Startup scrub (spec.md §8): no `ProxyHost` may reference a
    /// Let's-Encrypt certificate by id — such rows are cleared in place.
    pub async fn clear_implicit_references(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE proxy_hosts SET certificate_id = NULL
               WHERE certificate_id IN (SELECT uuid FROM certificates WHERE provider = 'letsencrypt')"#,
        )
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
