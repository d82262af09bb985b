//! Access-list persistence.

use charon_types::{AccessList, AccessListType, IpRule};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct AccessListStore<'a> {
    pool: &'a PgPool,
}

fn row_to_list(row: &sqlx::postgres::PgRow) -> Result<AccessList, sqlx::Error> {
    let kind_str: String = row.try_get("kind")?;
    let ip_rules_json: serde_json::Value = row.try_get("ip_rules")?;
    let ip_rules: Vec<IpRule> =
        serde_json::from_value(ip_rules_json).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
    let countries_json: serde_json::Value = row.try_get("country_codes")?;
    let country_codes: Vec<String> =
        serde_json::from_value(countries_json).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

    let kind = match kind_str.as_str() {
        "whitelist" => AccessListType::Whitelist,
        "blacklist" => AccessListType::Blacklist,
        "geo_whitelist" => AccessListType::GeoWhitelist,
        "geo_blacklist" => AccessListType::GeoBlacklist,
        _ => AccessListType::LocalOnly,
    };

    Ok(AccessList {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        kind,
        ip_rules,
        country_codes,
        local_network_only: row.try_get("local_network_only")?,
        enabled: row.try_get("enabled")?,
    })
}

fn kind_str(kind: AccessListType) -> &'static str {
    match kind {
        AccessListType::Whitelist => "whitelist",
        AccessListType::Blacklist => "blacklist",
        AccessListType::GeoWhitelist => "geo_whitelist",
        AccessListType::GeoBlacklist => "geo_blacklist",
        AccessListType::LocalOnly => "local_only",
    }
}

impl<'a> AccessListStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<AccessList>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM access_lists ORDER BY name").fetch_all(self.pool).await?;
        rows.iter().map(row_to_list).collect()
    }

    pub async fn get(&self, uuid: Uuid) -> Result<Option<AccessList>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM access_lists WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(row_to_list).transpose()
    }

    pub async fn upsert(&self, list: &AccessList) -> Result<(), sqlx::Error> {
        let ip_rules_json =
            serde_json::to_value(&list.ip_rules).map_err(|err| sqlx::Error::Encode(Box::new(err)))?;
        let countries_json = serde_json::to_value(&list.country_codes)
            .map_err(|err| sqlx::Error::Encode(Box::new(err)))?;

        sqlx::query(
            r#"INSERT INTO access_lists (uuid, name, kind, ip_rules, country_codes, local_network_only, enabled)
               VALUES ($1,$2,$3,$4,$5,$6,$7)
               ON CONFLICT (uuid) DO UPDATE SET
                 name = EXCLUDED.name, kind = EXCLUDED.kind, ip_rules = EXCLUDED.ip_rules,
                 country_codes = EXCLUDED.country_codes,
                 local_network_only = EXCLUDED.local_network_only, enabled = EXCLUDED.enabled"#,
        )
        .bind(list.uuid)
        .bind(&list.name)
        .bind(kind_str(list.kind))
        .bind(ip_rules_json)
        .bind(countries_json)
        .bind(list.local_network_only)
        .bind(list.enabled)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, uuid: Uuid) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM access_lists WHERE uuid = $1").bind(uuid).execute(self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// True if any enabled `ProxyHost` still references this list — used
    /// to refuse deletion of an in-use access list.
    pub async fn is_referenced(&self, uuid: Uuid) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM proxy_hosts WHERE access_list_id = $1")
            .bind(uuid)
            .fetch_one(self.pool)
            .await?;
        let count: i64 = row.try_get("n")?;
        Ok(count > 0)
    }
}
