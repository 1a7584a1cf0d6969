//! REST transport and a full run over HTTP against a mock controller

use std::time::Duration;

use fabric_reconciler::client::{
    resolve_endpoints, ControllerClient, ControllerVersion, EndpointProvider, RestClient,
};
use fabric_reconciler::config::{ControllerSettings, RunConfig};
use fabric_reconciler::controller::{ReconcileRequest, ReconciliationController};
use fabric_reconciler::kinds::kind_by_name;
use fabric_reconciler::Error;
use serde_json::json;
use tokio_test::assert_err;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn settings(url: &str, password_env: &str) -> ControllerSettings {
    ControllerSettings {
        url: url.to_string(),
        username: "admin".to_string(),
        password_env: Some(password_env.to_string()),
        token_env: None,
        domain: "local".to_string(),
        verify_tls: false,
        timeout_secs: 5,
        version: ControllerVersion::Auto,
    }
}

// ── transport ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_token_is_sent_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(
            json!({"userName": "admin", "userPasswd": "secret", "domain": "local"}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jwttoken": "tok-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/things"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .mount(&server)
        .await;

    std::env::set_var("FABRIC_RECONCILER_TEST_PW_LOGIN", "secret");
    let client = RestClient::connect(&settings(&server.uri(), "FABRIC_RECONCILER_TEST_PW_LOGIN"))
        .await
        .unwrap();

    let envelope = client.get("/rest/things").await.unwrap();
    assert!(envelope.is_success());
    assert_eq!(envelope.method, "GET");
    assert_eq!(envelope.path, "/rest/things");
    assert_eq!(envelope.data, json!([{"id": 1}]));
}

#[tokio::test]
async fn test_failed_login_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    std::env::set_var("FABRIC_RECONCILER_TEST_PW_DENIED", "wrong");
    let err = RestClient::connect(&settings(&server.uri(), "FABRIC_RECONCILER_TEST_PW_DENIED"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::TransportError { ref path, .. } if path == "/login"));
}

#[tokio::test]
async fn test_missing_password_variable_is_a_config_error() {
    let err = RestClient::connect(&settings(
        "http://127.0.0.1:9",
        "FABRIC_RECONCILER_TEST_PW_UNSET",
    ))
    .await
    .err()
    .unwrap();
    assert!(matches!(err, Error::ConfigError(_)));
}

#[tokio::test]
async fn test_non_success_status_becomes_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such fabric"))
        .mount(&server)
        .await;

    let client = RestClient::with_token(&server.uri(), "tok", TIMEOUT).unwrap();
    let envelope = client.get("/rest/missing").await.unwrap();
    assert_eq!(envelope.status_code, 404);
    assert_eq!(envelope.message, "Not Found");
    assert_eq!(envelope.data, json!("no such fabric"));
    assert!(!envelope.is_success());
}

#[tokio::test]
async fn test_forbidden_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = RestClient::with_token(&server.uri(), "expired", TIMEOUT).unwrap();
    let err = assert_err!(client.get("/rest/anything").await);
    assert!(matches!(err, Error::TransportError { .. }));
    assert!(err.is_retriable());
}

#[tokio::test]
async fn test_put_sends_json_and_accepts_empty_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/rest/items/a"))
        .and(body_json(json!({"name": "a", "value": 2})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::with_token(&server.uri(), "tok", TIMEOUT).unwrap();
    let envelope = client
        .put("/rest/items/a", &json!({"name": "a", "value": 2}))
        .await
        .unwrap();
    assert!(envelope.is_success());
    assert!(envelope.data.is_null());
}

// ── full run ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_merged_vpc_pair_over_http() {
    let server = MockServer::start().await;
    let lan = "/appcenter/Cisco/ndfc/api/v1/lan-fabric/rest";

    Mock::given(method("GET"))
        .and(path("/appcenter/Cisco/ndfc/api/about/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "12.1.3"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{lan}/vpcpair/fabrics/site-a")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{lan}/vpcpair/fabrics/site-a")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{lan}/control/fabrics/site-a/config-save")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!(
            "{lan}/control/fabrics/site-a/config-deploy/FDO1,FDO2"
        )))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!(
            "{lan}/control/fabrics/site-a/inventory/switchesByFabric"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"serialNumber": "FDO1", "ipAddress": "10.1.1.1", "ccStatus": "In-Sync"},
            {"serialNumber": "FDO2", "ipAddress": "10.1.1.2", "ccStatus": "In-Sync"}
        ])))
        .mount(&server)
        .await;

    let yaml = format!(
        r#"
controller:
  url: {}
  token_env: FABRIC_RECONCILER_TEST_TOKEN_RUN
fabric: site-a
kind: vpc_pair
state: merged
poll:
  max_attempts: 2
  interval_secs: 0
config:
  - peerOneId: FDO1
    peerTwoId: FDO2
    profile:
      domainId: 7
      peer1MemberInterfaces: [e1/1, e1/2]
"#,
        server.uri()
    );
    std::env::set_var("FABRIC_RECONCILER_TEST_TOKEN_RUN", "tok");
    let config = RunConfig::from_yaml(&yaml).unwrap();

    let client = RestClient::connect(&config.controller).await.unwrap();
    let endpoints = resolve_endpoints(&client, config.controller.version)
        .await
        .unwrap();
    assert_eq!(endpoints.version(), ControllerVersion::Ndfc12);

    let kind = kind_by_name(&config.kind).unwrap();
    let outcome = ReconciliationController::new(&client, endpoints.as_ref(), kind.as_ref())
        .run(ReconcileRequest::from_config(&config, false))
        .await
        .unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.poll_attempts, 1);
    assert_eq!(
        outcome.diff.create[0]["profile"]["peer1MemberInterfaces"],
        json!("e1/1,e1/2")
    );
}
