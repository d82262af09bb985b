//! Break-glass token issuance and verification (spec.md §4.2).
//!
//! Tokens are random, >= 256 bits, returned once in plaintext, stored only
//! as a SHA-256 hash, and invalidated on first successful use or expiry.

use crate::store::Store;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::net::IpAddr;

const TOKEN_BYTES: usize = 32; // 256 bits
const TOKEN_TTL_MINUTES: i64 = 15;

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// Generates a new token, stores its hash, and returns the plaintext once.
pub async fn issue(store: &Store) -> Result<String, sqlx::Error> {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plaintext = bytes.iter().map(|b| format!("{b:02x}")).collect::<String>();

    let expires_at = chrono::Utc::now() + chrono::Duration::minutes(TOKEN_TTL_MINUTES);
    store.security().issue_break_glass_token(hash_token(&plaintext), expires_at).await?;

    Ok(plaintext)
}

/// Consumes a token if it is valid, marking it used so it cannot be replayed.
pub async fn verify_and_consume(store: &Store, plaintext: &str) -> Result<bool, sqlx::Error> {
    let hash = hash_token(plaintext);
    let Some(token) = store.security().find_valid_break_glass_token(&hash).await? else {
        return Ok(false);
    };
    store.security().mark_break_glass_token_used(token.uuid).await?;
    Ok(true)
}

fn is_loopback(ip: IpAddr) -> bool {
    ip.is_loopback()
}

/// spec.md §4.2: a config change that could lock the operator out of the
/// management API (ending up in `block` mode with no admin whitelist)
/// requires either a valid break-glass token or a loopback origin.
pub fn would_lock_out(next: &charon_types::SecurityConfig) -> bool {
    next.waf_mode == charon_types::WafMode::Block && !next.has_admin_whitelist()
}

/// Authorizes an otherwise-lockout-risking change: passes if the caller is
/// loopback, or supplies a token that verifies and is consumed.
pub async fn authorize(
    store: &Store,
    caller_ip: Option<IpAddr>,
    token_header: Option<&str>,
) -> Result<bool, sqlx::Error> {
    if caller_ip.is_some_and(is_loopback) {
        return Ok(true);
    }
    match token_header {
        Some(token) => verify_and_consume(store, token).await,
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charon_types::{SecurityConfig, WafMode};

    #[test]
    fn enabling_block_mode_without_whitelist_would_lock_out() {
        let mut next = SecurityConfig::default();
        next.waf_mode = WafMode::Block;
        assert!(would_lock_out(&next));
    }

    #[test]
    fn enabling_block_mode_with_whitelist_is_safe() {
        let mut next = SecurityConfig::default();
        next.waf_mode = WafMode::Block;
        next.admin_whitelist = "10.0.0.1".into();
        assert!(!would_lock_out(&next));
    }

    #[test]
    fn monitor_mode_never_requires_break_glass() {
        let mut next = SecurityConfig::default();
        next.waf_mode = WafMode::Monitor;
        assert!(!would_lock_out(&next));
    }
}
