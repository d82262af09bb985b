//! Prometheus counters for the security middleware pipeline.
//!
//! Vendor prefix `charon_`, mirroring the reference crate's `antigravity_*`
//! convention in `proxy::prometheus`. Registered once at startup;
//! incremented from the Cerberus middleware on every management request.

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the process-wide Prometheus recorder and registers every
/// counter's description. Idempotent — safe to call once at startup.
/// Grounded on the reference crate's `proxy::prometheus::init_metrics`.
pub fn install() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle =
                PrometheusBuilder::new().install_recorder().expect("failed to install prometheus recorder");
            describe();
            handle
        })
        .clone()
}

/// Renders the current metrics snapshot as Prometheus text exposition
/// (`GET /metrics`, spec.md §6 — unauthenticated).
pub fn render() -> String {
    PROMETHEUS_HANDLE.get().map_or_else(|| "# metrics not initialized\n".to_string(), PrometheusHandle::render)
}

pub fn describe() {
    describe_counter!("charon_waf_requests_total", "Total requests evaluated by the WAF step");
    describe_counter!("charon_waf_blocked_total", "Requests blocked by the WAF in block mode");
    describe_counter!(
        "charon_waf_monitored_total",
        "Requests that matched a WAF rule while in monitor mode"
    );
    describe_counter!("charon_acl_denied_total", "Requests denied by an access control list");
    describe_counter!(
        "charon_cerberus_evaluations_total",
        "Total requests that passed through the Cerberus pipeline"
    );
}

pub fn record_evaluation() {
    counter!("charon_cerberus_evaluations_total").increment(1);
}

pub fn record_waf_request() {
    counter!("charon_waf_requests_total").increment(1);
}

pub fn record_waf_blocked() {
    counter!("charon_waf_blocked_total").increment(1);
}

pub fn record_waf_monitored() {
    counter!("charon_waf_monitored_total").increment(1);
}

pub fn record_acl_denied() {
    counter!("charon_acl_denied_total").increment(1);
}
