//! The Kuma bridge served over HTTP in front of a mock Icinga2 API.

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{json, Value};
use synapse_checks::icinga::IcingaClient;
use synapse_checks::kuma::{build_router, AppState};
use tokio::net::TcpListener;
use wiremock::matchers::{basic_auth, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Test Helpers
// =============================================================================

async fn mock_icinga() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/objects/hosts"))
        .and(basic_auth("icingaweb2", "secret"))
        .and(header("x-http-method-override", "GET"))
        .and(body_partial_json(json!({"filter_vars": {"hpattern": "web"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [{
            "name": "web",
            "type": "Host",
            "attrs": {"state": 0.0, "acknowledgement": 0.0, "acknowledgement_expiry": 0.0}
        }]})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/objects/hosts"))
        .and(body_partial_json(json!({"filter_vars": {"hpattern": "nope"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/objects/services"))
        .and(body_partial_json(json!({
            "filter": "match(hpattern, host.name)",
            "filter_vars": {"hpattern": "web"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [
            {"name": "web!http", "attrs": {"state": 0.0, "acknowledgement": 0.0, "acknowledgement_expiry": 0.0}},
            {"name": "web!disk", "attrs": {"state": 2.0, "acknowledgement": 0.0, "acknowledgement_expiry": 0.0}},
            {"name": "web!load", "attrs": {"state": 1.0, "acknowledgement": 1.0, "acknowledgement_expiry": 0.0}}
        ]})))
        .mount(&server)
        .await;

    server
}

/// Start the bridge on a random port.
async fn start_bridge(icinga: &MockServer) -> SocketAddr {
    let client = IcingaClient::new(icinga.uri(), "icingaweb2", "secret").unwrap();
    let app = build_router(AppState { icinga: client });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    addr
}

async fn get(addr: SocketAddr, path_and_query: &str) -> (u16, Value) {
    let response = reqwest::get(format!("http://{addr}{path_and_query}"))
        .await
        .expect("Failed to send request");
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_missing_host_is_not_acceptable() {
    let icinga = mock_icinga().await;
    let addr = start_bridge(&icinga).await;

    for route in ["/host", "/host/"] {
        let (status, body) = get(addr, route).await;
        assert_eq!(status, 406, "{route}");
        assert_eq!(body, json!({"error": "must specify host"}));
    }
}

#[tokio::test]
async fn test_unknown_host_is_not_found() {
    let icinga = mock_icinga().await;
    let addr = start_bridge(&icinga).await;

    let (status, body) = get(addr, "/host/nope").await;
    assert_eq!(status, 404);
    assert_eq!(body, json!({"error": "could not find host"}));
}

#[tokio::test]
async fn test_host_report() {
    let icinga = mock_icinga().await;
    let addr = start_bridge(&icinga).await;

    let (status, body) = get(addr, "/host/web").await;
    assert_eq!(status, 200);
    assert_eq!(body["host"]["name"], "web");
    assert_eq!(body["services"]["load"]["state"], 0);
    assert_eq!(body["services"]["load"]["actual_state"], 1);
    assert_eq!(body["failed_services"], json!([{"name": "disk", "state": 2}]));
}

#[tokio::test]
async fn test_kuma_mode_fails_with_gone() {
    let icinga = mock_icinga().await;
    let addr = start_bridge(&icinga).await;

    let (status, _) = get(addr, "/host/web?kuma=true").await;
    assert_eq!(status, 410);

    let (status, body) = get(addr, "/host/web?kuma=true&ignore=disk").await;
    assert_eq!(status, 200);
    assert_eq!(body["ignored_services"], json!(["disk"]));

    let (status, body) = get(addr, "/host/web?kuma=true&exclude=disk").await;
    assert_eq!(status, 200);
    assert_eq!(body["excluded_services"], json!(["disk"]));
}

#[tokio::test]
async fn test_service_filter() {
    let icinga = mock_icinga().await;
    let addr = start_bridge(&icinga).await;

    let (status, body) = get(addr, "/host/web?service=http&service=load").await;
    assert_eq!(status, 200);
    let names: Vec<&String> = body["services"].as_object().unwrap().keys().collect();
    assert_eq!(names, vec!["http", "load"]);

    let (status, body) = get(addr, "/host/web?service=http&service=http").await;
    assert_eq!(status, 200);
    assert_eq!(body["services"].as_object().unwrap().len(), 1);

    let (status, body) = get(addr, "/host/web?service=backup").await;
    assert_eq!(status, 400);
    assert_eq!(body, json!({"error": "service not found", "service": "backup"}));
}
