#![allow(clippy::expect_used, reason = "integration test — panics are the assertion mechanism")]

use charon_admin_client::{ClientConfig, ClientError, DataPlaneClient};
use charon_types::dataplane::CaddyConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> DataPlaneClient {
    DataPlaneClient::new(ClientConfig {
        base_url: server.uri(),
        max_retries: 2,
        base_delay_ms: 10,
        max_delay_ms: 20,
        ..ClientConfig::default()
    })
    .expect("client config is valid")
}

#[tokio::test]
async fn retries_transient_server_errors_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/load"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/load"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let result = client(&server).patch_config(&CaddyConfig::default()).await;
    assert!(result.is_ok(), "expected retry to recover, got {result:?}");
}

#[tokio::test]
async fn does_not_retry_a_4xx_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/load"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad config"))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server).patch_config(&CaddyConfig::default()).await;
    match result {
        Err(ClientError::ConfigRejected { status, .. }) => assert_eq!(status, 400),
        other => panic!("expected ConfigRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn gives_up_after_exhausting_retries() {
    let server = MockServer::start().await;

    Mock::given(method("POST")).and(path("/load")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

    let result = client(&server).patch_config(&CaddyConfig::default()).await;
    assert!(matches!(result, Err(ClientError::RetriesExhausted(_))), "expected exhaustion, got {result:?}");
}
