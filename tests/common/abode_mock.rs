//! WireMock-based Abode API mocking infrastructure
//!
//! Provides a mock cloud service that answers the login handshake, plus
//! helpers to mount endpoint behaviour and inspect what the client sent.

use abode_client::client::urls;
use abode_client::{AbodeClient, ClientConfig, Credentials};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, Request, ResponseTemplate,
};

pub const API_KEY: &str = "test-api-key";
pub const OAUTH_TOKEN: &str = "test-oauth-token";
pub const USERNAME: &str = "user@example.com";
pub const PASSWORD: &str = "correct-horse";

/// Mock Abode cloud service
pub struct MockAbodeServer {
    pub server: MockServer,
    pub base_url: String,
}

impl MockAbodeServer {
    /// Start a server that accepts logins
    pub async fn start() -> Self {
        let mock = Self::bare().await;
        mock.mock_login(panel_doc()).await;
        mock
    }

    /// Start a server with no endpoints mounted
    pub async fn bare() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();
        Self { server, base_url }
    }

    /// Successful login and claims handshake
    pub async fn mock_login(&self, panel: Value) {
        Mock::given(method("POST"))
            .and(path(urls::LOGIN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": API_KEY,
                "panel": panel,
                "user": {"id": USERNAME, "first_name": "Test"},
            })))
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path(urls::OAUTH_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": OAUTH_TOKEN,
            })))
            .mount(&self.server)
            .await;
    }

    /// `GET path` answers with `body`
    pub async fn mock_get_json(&self, endpoint: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// `GET path` answers with a bare status
    pub async fn mock_get_status(&self, endpoint: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// `GET path` never answers within the client timeout
    pub async fn mock_get_hanging(&self, endpoint: &str) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&self.server)
            .await;
    }

    /// Client pointed at this server with test-sized delays
    pub fn client(&self) -> AbodeClient {
        self.client_with(fast_config(&self.base_url))
    }

    pub fn client_with(&self, config: ClientConfig) -> AbodeClient {
        AbodeClient::new(config, Credentials::new(USERNAME, PASSWORD))
            .expect("test config is valid")
    }

    pub fn config(&self) -> ClientConfig {
        fast_config(&self.base_url)
    }

    /// Requests received for `endpoint`
    pub async fn requests_to(&self, endpoint: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == endpoint)
            .collect()
    }

    pub async fn count(&self, endpoint: &str) -> usize {
        self.requests_to(endpoint).await.len()
    }

    pub async fn login_count(&self) -> usize {
        self.count(urls::LOGIN).await
    }
}

/// Client configuration with every delay shrunk to milliseconds
pub fn fast_config(base_url: &str) -> ClientConfig {
    let mut config = ClientConfig::default()
        .with_base_url(base_url)
        .expect("mock server url is valid");

    config.timeouts.total = Duration::from_millis(300);
    config.timeouts.connect = Duration::from_millis(200);
    config.timeouts.read = Duration::from_millis(300);
    config.retry.backoff_seed = Duration::from_millis(5);
    config.retry.backoff_cap = Duration::from_millis(20);
    config.retry.rate_limit_floor = Duration::from_millis(50);
    config.retry.rate_limit_cap = Duration::from_millis(400);
    config.session.monitor_enabled = false;
    config.session.monitor_interval = Duration::from_millis(50);
    config
}

/// Panel document as returned by login and `GET /api/v1/panel`
pub fn panel_doc() -> Value {
    json!({
        "name": "Test Home",
        "mode": {"area_1": "standby", "area_2": "standby"},
        "battery": "0",
        "is_cellular": "0",
        "mac": "AA:BB:CC:DD:EE:FF",
        "attributes": {
            "cms": {
                "monitoringActive": true,
                "testModeActive": false,
                "sendMedia": false
            }
        }
    })
}

/// Device listing with one known and one unknown device type
pub fn devices_doc() -> Value {
    json!([
        {
            "id": "RF:00000001",
            "type_tag": "device_type.door_contact",
            "name": "Front Door",
            "status": "Closed"
        },
        {
            "id": "ZW:00000002",
            "type_tag": "device_type.door_lock",
            "name": "Back Door Lock",
            "status": "LockClosed"
        },
        {
            "id": "XX:00000003",
            "type_tag": "device_type.flux_capacitor",
            "name": "Mystery"
        }
    ])
}
