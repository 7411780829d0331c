// Integration tests for `HealthClient` using wiremock.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vigil_api::{Error, HealthClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

const TIMEOUT: Duration = Duration::from_secs(2);

async fn setup() -> (MockServer, HealthClient, Url) {
    let server = MockServer::start().await;
    let client = HealthClient::from_reqwest(reqwest::Client::new());
    let endpoint = Url::parse(&format!("{}/api/health", server.uri())).unwrap();
    (server, client, endpoint)
}

// ── Happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_success_flag_is_healthy() {
    let (server, client, endpoint) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": true, "message": "ready" })),
        )
        .mount(&server)
        .await;

    let report = client.check(&endpoint, TIMEOUT).await.unwrap();
    assert_eq!(report.status, 200);
    assert_eq!(report.message.as_deref(), Some("ready"));
}

#[tokio::test]
async fn test_status_ok_is_healthy() {
    let (server, client, endpoint) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;

    assert!(client.check(&endpoint, TIMEOUT).await.is_ok());
}

#[tokio::test]
async fn test_api_key_header_is_sent() {
    let server = MockServer::start().await;
    let transport = TransportConfig::default().with_api_key("s3cret".to_string().into());
    let client = HealthClient::new(&transport).unwrap();
    let endpoint = Url::parse(&format!("{}/api/health", server.uri())).unwrap();

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .and(header("X-API-KEY", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client.check(&endpoint, TIMEOUT).await.is_ok());
}

// ── Failure modes ───────────────────────────────────────────────────

#[tokio::test]
async fn test_server_error_status() {
    let (server, client, endpoint) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.check(&endpoint, TIMEOUT).await.unwrap_err();
    assert!(
        matches!(err, Error::UnexpectedStatus { status: 503 }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_malformed_body() {
    let (server, client, endpoint) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = client.check(&endpoint, TIMEOUT).await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert!(body.contains("gateway")),
        other => panic!("expected Deserialization, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unhealthy_body() {
    let (server, client, endpoint) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": false, "message": "db down" })),
        )
        .mount(&server)
        .await;

    let err = client.check(&endpoint, TIMEOUT).await.unwrap_err();
    match err {
        Error::Unhealthy { detail } => assert_eq!(detail, "db down"),
        other => panic!("expected Unhealthy, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let (server, client, endpoint) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true }))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let err = client
        .check(&endpoint, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "got {err:?}");
    assert!(matches!(err, Error::Timeout { timeout_ms: 50 }));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let client = HealthClient::from_reqwest(reqwest::Client::new());
    // Port 9 (discard) is essentially never listening on loopback.
    let endpoint = Url::parse("http://127.0.0.1:9/api/health").unwrap();

    let err = client.check(&endpoint, TIMEOUT).await.unwrap_err();
    assert!(err.is_transport(), "got {err:?}");
}
