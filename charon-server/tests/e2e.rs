#![allow(clippy::expect_used, reason = "integration test — panics are the assertion mechanism")]

//! End-to-end scenarios from spec.md §8, run against the real router with
//! a wiremock data-plane double. Needs a live Postgres reachable via
//! `DATABASE_URL` (the teacher ships no test-database infrastructure
//! either, so these skip rather than fail when it's unset).

use axum::body::Body;
use axum::http::{Request, StatusCode};
use charon_admin_client::{ClientConfig, DataPlaneClient};
use charon_core::cerberus::CerberusState;
use charon_core::notify::{spawn_dispatch_task, LoggingDispatcher};
use charon_core::projection::{spawn_apply_task, ProjectionEngine};
use charon_core::{Settings, Store};
use charon_types::{
    CertificateProvider, ForwardScheme, ProxyHost, RuleSetMode, SecurityConfig, SecurityRuleSet,
    WafMode,
};
use serde_json::{json, Value};
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn try_store() -> Option<Store> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new().max_connections(5).connect(&database_url).await.ok()?;
    let store = Store::new(pool);
    store.migrate().await.expect("migrations must apply cleanly");
    Some(store)
}

fn test_settings(data_plane: &MockServer) -> Settings {
    Settings {
        bind_addr: "127.0.0.1:0".parse().expect("valid addr"),
        database_url: std::env::var("DATABASE_URL").expect("checked by try_store"),
        data_plane_admin_url: data_plane.uri(),
        caddy_config_dir: std::env::temp_dir(),
        acme_staging: false,
        initial_waf_mode: None,
        heartbeat_retention_days: 30,
        trusted_proxies: vec![],
        log_json: false,
    }
}

async fn build_app(store: Store, data_plane: &MockServer) -> axum::Router {
    let client = DataPlaneClient::new(ClientConfig { base_url: data_plane.uri(), ..ClientConfig::default() })
        .expect("client config is valid");
    let settings = Arc::new(test_settings(data_plane));
    let (notify, _notify_shutdown, _notify_task) =
        spawn_dispatch_task(store.clone(), Arc::new(LoggingDispatcher));
    let projection = Arc::new(ProjectionEngine::new(
        store.clone(),
        client,
        settings.rulesets_dir(),
        settings.acme_staging,
        notify.clone(),
    ));
    let (apply, _apply_shutdown, _apply_task) = spawn_apply_task(Arc::clone(&projection));
    let cerberus =
        CerberusState::load(store.clone(), vec![]).await.expect("cerberus snapshot loads");

    let app_state = charon_server::state::AppState::new(store, projection, apply, cerberus, notify, settings);
    charon_server::router::build_router(app_state)
}

async fn mount_load_ok(data_plane: &MockServer) {
    Mock::given(method("GET")).and(path("/config/")).respond_with(ResponseTemplate::new(200).set_body_json(json!({"apps":{}}))).mount(data_plane).await;
    Mock::given(method("POST")).and(path("/load")).respond_with(ResponseTemplate::new(200)).mount(data_plane).await;
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.expect("router never errors at the service layer");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body readable");
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).expect("json body") };
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .extension(axum::extract::ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 54321))))
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn metric_value(exposition: &str, name: &str) -> f64 {
    exposition
        .lines()
        .find(|line| line.starts_with(name) && line[name.len()..].starts_with(' '))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|value| value.parse().ok())
        .unwrap_or(0.0)
}

fn script_tag_ruleset(name: &str) -> SecurityRuleSet {
    SecurityRuleSet {
        uuid: Uuid::new_v4(),
        name: name.to_string(),
        source_url: None,
        mode: RuleSetMode::Blocking,
        content: r#"SecRule ARGS "@rx <script>" "id:1""#.to_string(),
    }
}

/// `http::Uri` rejects raw `<`/`>` bytes in a path or query, so the payload
/// travels in a header instead of the query string used in spec.md's
/// literal example — it still lands in the WAF's combined request surface
/// alongside the path and query (`cerberus::waf::request_surface`).
fn xss_probe_request(peer: SocketAddr) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri("/api/v1/system/my-ip")
        .header("x-probe-payload", "<script>")
        .extension(axum::extract::ConnectInfo(peer))
        .body(Body::empty())
        .expect("request builds")
}

fn host_payload(name: &str, domain: &str) -> Value {
    json!({
        "name": name,
        "domain_names": [domain],
        "forward_scheme": "http",
        "forward_host": "127.0.0.1",
        "forward_port": 8080,
    })
}

#[tokio::test]
async fn bulk_acl_partial_failure_matches_scenario_one() {
    let Some(store) = try_store().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };
    let data_plane = MockServer::start().await;
    mount_load_ok(&data_plane).await;
    let app = build_app(store.clone(), &data_plane).await;

    let (status, created_a) = send(&app, json_request("POST", "/api/v1/proxy-hosts", host_payload("a", "a.example.test"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let ua = created_a["uuid"].as_str().expect("uuid").to_string();

    let (status, created_b) = send(&app, json_request("POST", "/api/v1/proxy-hosts", host_payload("b", "b.example.test"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let ub = created_b["uuid"].as_str().expect("uuid").to_string();

    let uc = Uuid::new_v4();

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            "/api/v1/proxy-hosts/bulk-update-acl",
            json!({ "host_uuids": [ua, ub, uc.to_string()], "access_list_id": null }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 2);
    assert_eq!(body["errors"][0]["uuid"], uc.to_string());
    assert_eq!(body["errors"][0]["error"], "proxy host not found");
}

/// Shares the singleton `security_config` row with the WAF scenario tests,
/// so all three run under the same serial lock to avoid cross-test races.
#[tokio::test]
#[serial(security_config)]
async fn self_lockout_prevention_matches_scenario_four() {
    let Some(store) = try_store().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };
    store
        .security()
        .save_config(&charon_types::SecurityConfig::default())
        .await
        .expect("reset security config before asserting on it");

    let data_plane = MockServer::start().await;
    mount_load_ok(&data_plane).await;
    let app = build_app(store.clone(), &data_plane).await;

    let non_loopback_req = Request::builder()
        .method("POST")
        .uri("/api/v1/security/enable")
        .header("content-type", "application/json")
        .extension(axum::extract::ConnectInfo(SocketAddr::from(([203, 0, 113, 9], 1234))))
        .body(Body::from(json!({ "admin_whitelist": "" }).to_string()))
        .expect("request builds");
    let (status, body) = send(&app, non_loopback_req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().expect("error string").contains("admin_whitelist"));

    let loopback_req = Request::builder()
        .method("POST")
        .uri("/api/v1/security/enable")
        .header("content-type", "application/json")
        .extension(axum::extract::ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 1234))))
        .body(Body::from(json!({ "admin_whitelist": "" }).to_string()))
        .expect("request builds");
    let (status, _body) = send(&app, loopback_req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[serial(security_config)]
async fn waf_block_mode_matches_scenario_two() {
    let Some(store) = try_store().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };
    charon_core::cerberus::metrics::install();

    let ruleset = script_tag_ruleset("owasp-block-scenario-two");
    store.security().upsert_ruleset(&ruleset).await.expect("seed ruleset");
    store
        .security()
        .save_config(&SecurityConfig {
            waf_mode: WafMode::Block,
            waf_rules_source: Some(ruleset.name.clone()),
            ..SecurityConfig::default()
        })
        .await
        .expect("seed waf config");

    let data_plane = MockServer::start().await;
    mount_load_ok(&data_plane).await;
    let app = build_app(store.clone(), &data_plane).await;

    let before = metric_value(&charon_core::cerberus::metrics::render(), "charon_waf_blocked_total");
    let (status, body) =
        send(&app, xss_probe_request(SocketAddr::from(([203, 0, 113, 5], 4321)))).await;
    let after = metric_value(&charon_core::cerberus::metrics::render(), "charon_waf_blocked_total");

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "WAF: suspicious payload detected");
    assert_eq!(after - before, 1.0, "waf_blocked_total must increase by exactly one");

    store.security().save_config(&SecurityConfig::default()).await.expect("reset security config");
}

#[tokio::test]
#[serial(security_config)]
async fn waf_monitor_mode_matches_scenario_three() {
    let Some(store) = try_store().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };
    charon_core::cerberus::metrics::install();

    let ruleset = script_tag_ruleset("owasp-monitor-scenario-three");
    store.security().upsert_ruleset(&ruleset).await.expect("seed ruleset");
    store
        .security()
        .save_config(&SecurityConfig {
            waf_mode: WafMode::Monitor,
            waf_rules_source: Some(ruleset.name.clone()),
            ..SecurityConfig::default()
        })
        .await
        .expect("seed waf config");

    let data_plane = MockServer::start().await;
    mount_load_ok(&data_plane).await;
    let app = build_app(store.clone(), &data_plane).await;

    let metrics_before = charon_core::cerberus::metrics::render();
    let monitored_before = metric_value(&metrics_before, "charon_waf_monitored_total");
    let blocked_before = metric_value(&metrics_before, "charon_waf_blocked_total");

    let (status, body) =
        send(&app, xss_probe_request(SocketAddr::from(([203, 0, 113, 6], 4321)))).await;

    let metrics_after = charon_core::cerberus::metrics::render();
    let monitored_after = metric_value(&metrics_after, "charon_waf_monitored_total");
    let blocked_after = metric_value(&metrics_after, "charon_waf_blocked_total");

    assert_eq!(status, StatusCode::OK, "monitor mode must never block the downstream handler");
    assert!(body["ip"].as_str().is_some(), "the my-ip handler's own response shape must survive");
    assert_eq!(monitored_after - monitored_before, 1.0);
    assert_eq!(blocked_after, blocked_before, "monitor mode must never increment waf_blocked_total");

    store.security().save_config(&SecurityConfig::default()).await.expect("reset security config");
}

#[tokio::test]
async fn startup_scrub_matches_scenario_five() {
    let Some(store) = try_store().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let cert_uuid = Uuid::new_v4();
    let cert = charon_types::Certificate {
        uuid: cert_uuid,
        name: "implicit".to_string(),
        provider: CertificateProvider::Letsencrypt,
        domains: vec!["h1.example.test".to_string()],
        expires_at: None,
    };
    store.certificates().upsert(&cert).await.expect("seed certificate");

    let host_uuid = Uuid::new_v4();
    let host = ProxyHost {
        uuid: host_uuid,
        name: "h1".to_string(),
        domain_names: vec!["h1.example.test".to_string()],
        forward_scheme: ForwardScheme::Http,
        forward_host: "127.0.0.1".to_string(),
        forward_port: 8080,
        ssl_forced: false,
        http2_support: false,
        hsts_enabled: false,
        hsts_subdomains: false,
        block_exploits: false,
        websocket_support: false,
        enabled: true,
        application_preset: charon_types::ApplicationPreset::None,
        advanced_config: None,
        certificate_id: Some(cert_uuid),
        access_list_id: None,
        forward_auth_policy_id: None,
        locations: vec![],
    };
    store.proxy_hosts().upsert(&host).await.expect("seed host");

    let data_plane = MockServer::start().await;
    mount_load_ok(&data_plane).await;
    let client = DataPlaneClient::new(ClientConfig { base_url: data_plane.uri(), ..ClientConfig::default() })
        .expect("client config is valid");
    let (notify, _notify_shutdown, _notify_task) =
        spawn_dispatch_task(store.clone(), Arc::new(LoggingDispatcher));
    let projection = ProjectionEngine::new(store.clone(), client, std::env::temp_dir(), false, notify);
    projection.startup_reconcile().await.expect("startup reconcile succeeds");

    let reloaded = store.proxy_hosts().get(host_uuid).await.expect("lookup").expect("host exists");
    assert!(reloaded.certificate_id.is_none(), "letsencrypt reference must be scrubbed at boot");
}
