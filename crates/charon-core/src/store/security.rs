//! Security config, rulesets, and break-glass token persistence.

use charon_types::{
    AclMode, BreakGlassToken, CrowdsecMode, RateLimitMode, RuleSetMode, SecurityConfig,
    SecurityRuleSet, WafMode,
};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct SecurityStore<'a> {
    pool: &'a PgPool,
}

fn enum_str<T: serde::Serialize>(value: T) -> String {
    serde_json::to_value(value).ok().and_then(|v| v.as_str().map(String::from)).unwrap_or_default()
}

impl<'a> SecurityStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The singleton row is created by a migration with a fixed id, so
    /// this always resolves — an empty table is a migration bug, not a
    /// runtime state to model.
    pub async fn get_config(&self) -> Result<SecurityConfig, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM security_config WHERE id = 1").fetch_one(self.pool).await?;

        let waf_mode_str: String = row.try_get("waf_mode")?;
        let acl_mode_str: String = row.try_get("acl_mode")?;
        let rate_limit_mode_str: String = row.try_get("rate_limit_mode")?;
        let crowdsec_mode_str: String = row.try_get("crowdsec_mode")?;

        Ok(SecurityConfig {
            enabled: row.try_get("enabled")?,
            admin_whitelist: row.try_get("admin_whitelist")?,
            waf_mode: match waf_mode_str.as_str() {
                "monitor" => WafMode::Monitor,
                "block" => WafMode::Block,
                _ => WafMode::Disabled,
            },
            waf_rules_source: row.try_get("waf_rules_source")?,
            acl_mode: if acl_mode_str == "enabled" { AclMode::Enabled } else { AclMode::Disabled },
            rate_limit_mode: if rate_limit_mode_str == "enabled" {
                RateLimitMode::Enabled
            } else {
                RateLimitMode::Disabled
            },
            rate_limit_requests_per_minute: row
                .try_get::<Option<i32>, _>("rate_limit_requests_per_minute")?
                .map(|v| u32::try_from(v).unwrap_or(0)),
            crowdsec_mode: match crowdsec_mode_str.as_str() {
                "local" => CrowdsecMode::Local,
                "cloud" => CrowdsecMode::Cloud,
                _ => CrowdsecMode::Disabled,
            },
            crowdsec_api_url: row.try_get("crowdsec_api_url")?,
        })
    }

    pub async fn save_config(&self, config: &SecurityConfig) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE security_config SET
                 enabled = $1, admin_whitelist = $2, waf_mode = $3, waf_rules_source = $4,
                 acl_mode = $5, rate_limit_mode = $6, rate_limit_requests_per_minute = $7,
                 crowdsec_mode = $8, crowdsec_api_url = $9
               WHERE id = 1"#,
        )
        .bind(config.enabled)
        .bind(&config.admin_whitelist)
        .bind(enum_str(config.waf_mode))
        .bind(&config.waf_rules_source)
        .bind(enum_str(config.acl_mode))
        .bind(enum_str(config.rate_limit_mode))
        .bind(config.rate_limit_requests_per_minute.map(|v| i32::try_from(v).unwrap_or(i32::MAX)))
        .bind(enum_str(config.crowdsec_mode))
        .bind(&config.crowdsec_api_url)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_rulesets(&self) -> Result<Vec<SecurityRuleSet>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM security_rulesets ORDER BY name").fetch_all(self.pool).await?;
        rows.iter()
            .map(|row| {
                let mode_str: String = row.try_get("mode")?;
                Ok(SecurityRuleSet {
                    uuid: row.try_get("uuid")?,
                    name: row.try_get("name")?,
                    source_url: row.try_get("source_url")?,
                    mode: if mode_str == "detection" { RuleSetMode::Detection } else { RuleSetMode::Blocking },
                    content: row.try_get("content")?,
                })
            })
            .collect()
    }

    pub async fn upsert_ruleset(&self, ruleset: &SecurityRuleSet) -> Result<(), sqlx::Error> {
        let mode_str = match ruleset.mode {
            RuleSetMode::Blocking => "blocking",
            RuleSetMode::Detection => "detection",
        };
        sqlx::query(
            r#"INSERT INTO security_rulesets (uuid, name, source_url, mode, content)
               VALUES ($1,$2,$3,$4,$5)
               ON CONFLICT (uuid) DO UPDATE SET
                 name = EXCLUDED.name, source_url = EXCLUDED.source_url,
                 mode = EXCLUDED.mode, content = EXCLUDED.content"#,
        )
        .bind(ruleset.uuid)
        .bind(&ruleset.name)
        .bind(&ruleset.source_url)
        .bind(mode_str)
        .bind(&ruleset.content)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn issue_break_glass_token(
        &self,
        token_hash: String,
        expires_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<BreakGlassToken, sqlx::Error> {
        let uuid = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO break_glass_tokens (uuid, token_hash, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(uuid)
        .bind(&token_hash)
        .bind(expires_at)
        .execute(self.pool)
        .await?;
        Ok(BreakGlassToken { uuid, token_hash, expires_at, used_at: None })
    }

    pub async fn find_valid_break_glass_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<BreakGlassToken>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT * FROM break_glass_tokens WHERE token_hash = $1 AND used_at IS NULL AND expires_at > NOW()",
        )
        .bind(token_hash)
        .fetch_optional(self.pool)
        .await?;
        row.map(|row| {
            Ok(BreakGlassToken {
                uuid: row.try_get("uuid")?,
                token_hash: row.try_get("token_hash")?,
                expires_at: row.try_get("expires_at")?,
                used_at: row.try_get("used_at")?,
            })
        })
        .transpose()
    }

    pub async fn mark_break_glass_token_used(&self, uuid: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE break_glass_tokens SET used_at = NOW() WHERE uuid = $1")
            .bind(uuid)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
