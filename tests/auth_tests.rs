//! Login, MFA, logout and client identity

mod common;

use abode_client::client::urls;
use abode_client::error::{MFA_CODE_REQUIRED, UNKNOWN_MFA_TYPE};
use abode_client::{AbodeApi, AbodeError, ApiRequest};
use common::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_login_sends_credentials_and_stores_tokens() {
    let mock = MockAbodeServer::start().await;
    let client = mock.client();

    client.login().await.unwrap();

    let logins = mock.requests_to(urls::LOGIN).await;
    assert_eq!(logins.len(), 1);
    let body: Value = logins[0].body_json().unwrap();
    assert_eq!(body["id"], USERNAME);
    assert_eq!(body["password"], PASSWORD);
    assert!(body["uuid"].as_str().is_some_and(|u| !u.is_empty()));
    assert!(body.get("mfa_code").is_none());

    let claims = mock.requests_to(urls::OAUTH_TOKEN).await;
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].headers.get("ABODE-API-KEY").unwrap(), API_KEY);

    let diagnostics = client.connection_diagnostics().await;
    assert!(diagnostics.authenticated);
    assert_eq!(diagnostics.auth_count, 1);
    assert_eq!(diagnostics.status.to_string(), "connected");
}

#[tokio::test]
async fn test_requests_carry_both_tokens() {
    let mock = MockAbodeServer::start().await;
    Mock::given(method("GET"))
        .and(path(urls::PANEL))
        .and(header("ABODE-API-KEY", API_KEY))
        .and(header("Authorization", format!("Bearer {OAUTH_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(panel_doc()))
        .expect(1)
        .mount(&mock.server)
        .await;

    let client = mock.client();
    // no explicit login: the first request logs in on demand
    let response = client.send(ApiRequest::get(urls::PANEL)).await.unwrap();
    assert!(response.is_success());
    assert_eq!(mock.login_count().await, 1);
}

#[tokio::test]
async fn test_mfa_required_then_code_accepted() {
    let mock = MockAbodeServer::bare().await;
    Mock::given(method("POST"))
        .and(path(urls::LOGIN))
        .and(body_partial_json(json!({"mfa_code": "123456", "remember_me": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": API_KEY,
            "panel": panel_doc(),
            "user": {"id": USERNAME},
        })))
        .with_priority(1)
        .mount(&mock.server)
        .await;
    Mock::given(method("POST"))
        .and(path(urls::LOGIN))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"mfa_type": "google_authenticator"})),
        )
        .mount(&mock.server)
        .await;
    Mock::given(method("GET"))
        .and(path(urls::OAUTH_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": OAUTH_TOKEN})))
        .mount(&mock.server)
        .await;

    let client = mock.client();
    let error = client.login().await.unwrap_err();
    assert!(error.is_mfa_required());
    assert!(matches!(&error, AbodeError::Authentication { message, .. } if message == MFA_CODE_REQUIRED));
    assert!(!client.connection_diagnostics().await.authenticated);

    client.login_with_mfa("123456").await.unwrap();
    assert!(client.connection_diagnostics().await.authenticated);
}

#[tokio::test]
async fn test_unknown_mfa_type_is_rejected() {
    let mock = MockAbodeServer::bare().await;
    Mock::given(method("POST"))
        .and(path(urls::LOGIN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"mfa_type": "sms"})))
        .mount(&mock.server)
        .await;

    let error = mock.client().login().await.unwrap_err();
    assert!(matches!(error, AbodeError::Authentication { message, .. } if message == UNKNOWN_MFA_TYPE));
}

#[tokio::test]
async fn test_bad_credentials_fail_without_retry() {
    let mock = MockAbodeServer::bare().await;
    Mock::given(method("POST"))
        .and(path(urls::LOGIN))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"message": "Invalid email or password", "errorCode": 1})),
        )
        .expect(1)
        .mount(&mock.server)
        .await;

    let client = mock.client();
    let error = client.send(ApiRequest::get(urls::PANEL)).await.unwrap_err();
    match error {
        AbodeError::Authentication { status, message } => {
            assert_eq!(status, Some(400));
            assert_eq!(message, "Invalid email or password");
        }
        other => panic!("expected authentication error, got {other:?}"),
    }
    assert_eq!(mock.count(urls::PANEL).await, 0);
}

#[tokio::test]
async fn test_login_missing_token_is_api_error() {
    let mock = MockAbodeServer::bare().await;
    Mock::given(method("POST"))
        .and(path(urls::LOGIN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"panel": {}, "user": {}})))
        .mount(&mock.server)
        .await;

    assert!(matches!(mock.client().login().await, Err(AbodeError::Api { .. })));
}

#[tokio::test]
async fn test_unauthorized_response_clears_token() {
    let mock = MockAbodeServer::start().await;
    mock.mock_get_status(urls::DEVICES, 401).await;

    let client = mock.client();
    client.login().await.unwrap();

    let error = client.send(ApiRequest::get(urls::DEVICES)).await.unwrap_err();
    assert!(matches!(error, AbodeError::Authentication { status: Some(401), .. }));
    assert!(!client.connection_diagnostics().await.authenticated);
}

#[tokio::test]
async fn test_logout_posts_api_key_and_clears_state() {
    let mock = MockAbodeServer::start().await;
    Mock::given(method("POST"))
        .and(path(urls::LOGOUT))
        .and(header("ABODE-API-KEY", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 200})))
        .expect(1)
        .mount(&mock.server)
        .await;

    let client = mock.client();
    client.login().await.unwrap();
    client.logout().await.unwrap();

    let diagnostics = client.connection_diagnostics().await;
    assert!(!diagnostics.authenticated);
    assert_eq!(diagnostics.status.to_string(), "disconnected");

    // a second logout has nothing to do
    client.logout().await.unwrap();
}

#[tokio::test]
async fn test_logout_swallows_transport_errors() {
    let mock = MockAbodeServer::start().await;
    Mock::given(method("POST"))
        .and(path(urls::LOGOUT))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)))
        .mount(&mock.server)
        .await;

    let client = mock.client();
    client.login().await.unwrap();
    client.logout().await.unwrap();
    assert!(!client.connection_diagnostics().await.authenticated);
}

#[tokio::test]
async fn test_identity_persists_across_clients() {
    let mock = MockAbodeServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let identity_path = dir.path().join("identity.json");

    let mut config = mock.config();
    config.identity_path = Some(identity_path.clone());

    let first = mock.client_with(config.clone());
    first.login().await.unwrap();
    let second = mock.client_with(config);
    second.login().await.unwrap();

    let uuids: Vec<String> = mock
        .requests_to(urls::LOGIN)
        .await
        .iter()
        .map(|r| r.body_json::<Value>().unwrap()["uuid"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(uuids.len(), 2);
    assert_eq!(uuids[0], uuids[1]);

    let stored: Value = serde_json::from_str(&std::fs::read_to_string(&identity_path).unwrap()).unwrap();
    assert_eq!(stored["uuid"], uuids[0].as_str());
    assert!(stored["last_login"].is_string());
    assert_eq!(first.connection_diagnostics().await.client_uuid, uuids[0]);
}
