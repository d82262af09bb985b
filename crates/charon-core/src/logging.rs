//! Structured logging setup and field redaction.
//!
//! Every log line that might carry a break-glass token, API key, or CIDR
//! whitelist entry goes through [`redact_secret`] first — the full value
//! is never worth seeing in a log aggregator (spec.md cross-cutting
//! invariant: secrets are never logged in full).

use axum::http::HeaderMap;
use std::collections::BTreeMap;
use tracing_subscriber::{fmt, EnvFilter};

/// Header names (lowercase) whose values are never written to a log line.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "proxy-authorization",
    "x-api-key",
    "x-api-token",
    "x-access-token",
    "x-auth-token",
    "x-api-secret",
    "x-forwarded-for",
];

pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        fmt().with_env_filter(filter).json().with_current_span(true).with_span_list(true).init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }
}

/// Reduce a secret to a short fingerprint safe for logs: first four
/// characters plus length, e.g. `a1b2…(len=43)`. Values shorter than the
/// fingerprint prefix are fully masked instead of partially revealed.
pub fn redact_secret(value: &str) -> String {
    const PREFIX_LEN: usize = 4;
    if value.len() <= PREFIX_LEN {
        return "***".to_string();
    }
    let prefix: String = value.chars().take(PREFIX_LEN).collect();
    format!("{prefix}…(len={})", value.len())
}

/// Flattens a request's headers into a loggable map, replacing the value of
/// any header in [`SENSITIVE_HEADERS`] with `<redacted>`. Non-UTF-8 values
/// are rendered opaquely rather than dropped, so their redaction status is
/// still visible.
pub fn redact_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let name = name.as_str().to_ascii_lowercase();
            let rendered = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                "<redacted>".to_string()
            } else {
                value.to_str().map_or_else(|_| "<non-utf8>".to_string(), ToString::to_string)
            };
            (name, rendered)
        })
        .collect()
}

/// Strips control characters and truncates to 200 bytes, the bound applied
/// to any free-form string (request path, error detail) before it reaches a
/// log line. Query strings are never included by callers.
pub fn sanitize_for_log(value: &str) -> String {
    let cleaned: String = value.chars().filter(|c| !c.is_control()).collect();
    if cleaned.len() > 200 {
        cleaned.chars().take(200).collect()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_headers_masks_every_sensitive_name_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", "Bearer secret".parse().unwrap());
        headers.insert("Cookie", "session=abc".parse().unwrap());
        headers.insert("X-Forwarded-For", "10.0.0.1".parse().unwrap());
        headers.insert("X-Request-Id", "req-1".parse().unwrap());

        let out = redact_headers(&headers);
        assert_eq!(out["authorization"], "<redacted>");
        assert_eq!(out["cookie"], "<redacted>");
        assert_eq!(out["x-forwarded-for"], "<redacted>");
        assert_eq!(out["x-request-id"], "req-1");
    }

    #[test]
    fn sanitize_for_log_strips_control_chars_and_truncates() {
        let dirty = format!("/api\u{0007}/v1{}", "x".repeat(250));
        let out = sanitize_for_log(&dirty);
        assert!(!out.contains('\u{0007}'));
        assert_eq!(out.len(), 200);
    }

    #[test]
    fn redact_keeps_prefix_and_length_only() {
        let out = redact_secret("sk-ant-REDACTED");
        assert!(out.starts_with("sk-a"));
        assert!(!out.contains("abcdefghijklmnop"));
        assert!(out.contains("len=29"));
    }

    #[test]
    fn redact_masks_short_values_entirely() {
        assert_eq!(redact_secret("abc"), "***");
    }
}
