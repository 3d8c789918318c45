//! Public client handle

use crate::client::diagnostics::{ConnectionDiagnostics, ConnectionStatus};
use crate::client::executor::ApiRequest;
use crate::client::inner::ClientInner;
use crate::client::models::{as_list, id_string, Alarm, AlarmMode, Automation, Device};
use crate::client::panel_settings::SettingUpdate;
use crate::client::response::ApiResponse;
use crate::client::settings::{normalize, CmsSettings, TEST_MODE_ACTIVE};
use crate::client::{urls, AbodeApi};
use crate::config::identity::ClientIdentity;
use crate::config::{ClientConfig, Credentials};
use crate::error::{AbodeError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Cheaply cloneable handle to one Abode account
#[derive(Clone)]
pub struct AbodeClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for AbodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbodeClient")
            .field("base_url", &self.inner.config.base_url.as_str())
            .field("username", &self.inner.credentials.username)
            .finish()
    }
}

impl AbodeClient {
    /// Create a client. No network traffic happens until the first call.
    pub fn new(config: ClientConfig, credentials: Credentials) -> Result<Self> {
        config.validate()?;

        let identity = match &config.identity_path {
            Some(path) => ClientIdentity::load_or_create(path)?,
            None => ClientIdentity::generate(),
        };
        debug!(client_uuid = %identity.uuid, "Client identity ready");

        Ok(Self {
            inner: ClientInner::new(config, credentials, identity),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Send an arbitrary request through the retry policy
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.inner.send(request).await
    }

    /// Stop the session monitor and release the connection pool. Every later
    /// call fails with [`AbodeError::Closed`].
    pub async fn shutdown(&self) {
        self.inner.close_sessions().await;
        self.inner.auth.write().await.clear_tokens();
        self.inner
            .health
            .write()
            .await
            .set_status(ConnectionStatus::Disconnected, None);
        info!("Abode client shut down");
    }

    /// Reload devices and automations
    pub async fn refresh(&self) -> Result<()> {
        self.load_devices().await?;
        self.load_automations().await
    }

    /// Mode used when the alarm is switched on without an explicit mode
    pub async fn set_default_mode(&self, mode: &str) -> Result<()> {
        let mode = AlarmMode::parse_default(mode)?;
        *self.inner.default_mode.write().await = mode;
        Ok(())
    }

    pub async fn default_mode(&self) -> AlarmMode {
        self.inner.default_mode.read().await.clone()
    }

    /// Allow [`AbodeApi::get_test_mode`] again after it was disabled
    pub fn reset_test_mode_support(&self) {
        self.inner.test_mode_supported.store(true, Ordering::SeqCst);
    }

    pub fn test_mode_supported(&self) -> bool {
        self.inner.test_mode_supported.load(Ordering::SeqCst)
    }

    /// Settings fetches that went to the network so far
    pub fn settings_fetch_count(&self) -> u64 {
        self.inner.settings.fetch_count()
    }

    async fn load_devices(&self) -> Result<()> {
        info!("Updating all devices");
        let docs = self.inner.send(ApiRequest::get(urls::DEVICES)).await?.as_json()?;

        let mut devices = BTreeMap::new();
        for doc in as_list(docs) {
            match Device::from_doc(&doc)? {
                Some(device) => {
                    devices.insert(device.id.clone(), device);
                }
                None => debug!(device = %doc, "Skipping unknown device"),
            }
        }

        // the panel itself is treated as the alarm device
        let panel = self.inner.send(ApiRequest::get(urls::PANEL)).await?.as_json()?;

        let mut cache = self.inner.cache.write().await;
        let merged = match (cache.panel.take(), panel) {
            (Some(Value::Object(mut current)), Value::Object(update)) => {
                current.extend(update);
                Value::Object(current)
            }
            (_, panel) => panel,
        };
        info!(devices = devices.len(), "Devices updated");
        cache.panel = Some(merged);
        cache.devices = Some(devices);
        Ok(())
    }

    async fn load_automations(&self) -> Result<()> {
        info!("Updating all automations");
        let response = self
            .inner
            .send(ApiRequest::get(urls::AUTOMATION).raise_on_error(false))
            .await?;

        let docs = if response.status().as_u16() == 404 {
            info!("Automations endpoint unavailable, treating as zero automations");
            Value::Array(Vec::new())
        } else if !response.is_success() {
            return Err(AbodeError::api_status(
                response.status().as_u16(),
                response.best_message(),
            ));
        } else {
            response.as_json()?
        };

        let automations = as_list(docs)
            .iter()
            .map(|doc| Automation::from_doc(doc).map(|a| (a.id.clone(), a)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        self.inner.cache.write().await.automations = Some(automations);
        Ok(())
    }

    async fn process_timeline_event(&self, timeline_id: &str, path: String, action: &str) -> Result<bool> {
        let response = self
            .inner
            .send(ApiRequest::post(path).raise_on_error(false))
            .await?;

        if response.is_success() {
            self.inner.settings.invalidate().await;
            let body = response
                .as_json()
                .map_err(|_| AbodeError::api("Timeline response was not JSON"))?;
            let complete = ["code", "message", "tid"].iter().all(|key| body.get(key).is_some());
            let echoed = body.get("tid").map(id_string);
            if !complete || echoed.as_deref() != Some(timeline_id) {
                return Err(AbodeError::api(format!(
                    "Unexpected response while processing timeline event {timeline_id}"
                )));
            }
            info!(timeline_id, action, "Timeline event processed");
            return Ok(true);
        }

        let body = response.as_json().ok();
        let message = body
            .as_ref()
            .and_then(|b| b.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        let error_code = body.as_ref().and_then(|b| b.get("errorCode")).cloned();

        if already_processed(error_code.as_ref(), &message) {
            info!(timeline_id, action, "Timeline event already processed: {message}");
            return Ok(true);
        }

        error!(
            timeline_id,
            action,
            error_code = ?error_code,
            "Failed to process timeline event: {message}"
        );
        Err(AbodeError::api_status(response.status().as_u16(), message))
    }
}

/// Whether a timeline error means another client handled the event first.
/// A symbolic `errorCode` decides when the server sends one; otherwise the
/// message is checked.
fn already_processed(error_code: Option<&Value>, message: &str) -> bool {
    match error_code.and_then(Value::as_str) {
        Some(code) => code.to_lowercase().contains("already"),
        None => message.to_lowercase().contains("already"),
    }
}

fn require_timeline_id(timeline_id: &str) -> Result<&str> {
    let timeline_id = timeline_id.trim();
    if timeline_id.is_empty() {
        return Err(AbodeError::invalid_input("Missing timeline event id"));
    }
    Ok(timeline_id)
}

#[async_trait]
impl AbodeApi for AbodeClient {
    async fn login(&self) -> Result<()> {
        self.inner.login_serialized(None).await
    }

    async fn login_with_mfa(&self, mfa_code: &str) -> Result<()> {
        let code = mfa_code.trim();
        if code.is_empty() {
            return Err(AbodeError::invalid_input("MFA code must not be empty"));
        }
        self.inner.login_serialized(Some(code)).await
    }

    async fn logout(&self) -> Result<()> {
        self.inner.logout().await
    }

    async fn get_devices(&self, refresh: bool, generic_type: Option<&str>) -> Result<Vec<Device>> {
        if refresh || self.inner.cache.read().await.devices.is_none() {
            self.load_devices().await?;
        }

        let cache = self.inner.cache.read().await;
        Ok(cache
            .devices
            .as_ref()
            .map(|devices| {
                devices
                    .values()
                    .filter(|d| generic_type.map_or(true, |t| d.generic_type == t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_device(&self, device_id: &str, refresh: bool) -> Result<Option<Device>> {
        if refresh || self.inner.cache.read().await.devices.is_none() {
            self.load_devices().await?;
        }
        Ok(self
            .inner
            .cache
            .read()
            .await
            .devices
            .as_ref()
            .and_then(|devices| devices.get(device_id).cloned()))
    }

    async fn get_alarm(&self, area: &str) -> Result<Alarm> {
        if self.inner.cache.read().await.devices.is_none() {
            self.load_devices().await?;
        }
        let cache = self.inner.cache.read().await;
        let panel = cache
            .panel
            .as_ref()
            .ok_or_else(|| AbodeError::api("Panel not loaded"))?;
        Alarm::from_panel(panel, area)
    }

    async fn get_automations(&self, refresh: bool) -> Result<Vec<Automation>> {
        if refresh || self.inner.cache.read().await.automations.is_none() {
            self.load_automations().await?;
        }
        Ok(self
            .inner
            .cache
            .read()
            .await
            .automations
            .as_ref()
            .map(|a| a.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_setting(&self, name: &str, value: &str, area: &str) -> Result<Value> {
        let update = SettingUpdate::load(name, value, area)?;
        let response = self
            .inner
            .send(ApiRequest::put(update.path).with_body(update.body))
            .await?;
        self.inner.settings.invalidate().await;
        info!(setting = name, value, area, "Setting updated");
        Ok(response.as_json_or_text())
    }

    async fn get_settings(&self, ttl: Option<Duration>) -> Result<CmsSettings> {
        self.inner
            .get_settings(ttl.unwrap_or(self.inner.config.settings_ttl))
            .await
    }

    async fn get_cms_settings(&self) -> Result<CmsSettings> {
        self.get_settings(None).await
    }

    async fn set_cms_setting(&self, key: &str, value: bool) -> Result<CmsSettings> {
        let response = self
            .inner
            .send(ApiRequest::post(urls::CMS_SETTINGS).with_body(json!({ key: value })))
            .await?;
        self.inner.settings.invalidate().await;

        let echoed = response
            .as_json()
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();

        match echoed.get(key) {
            None => {
                error!(key, "Setting missing from settings response");
                Err(AbodeError::api(format!("{key} missing from settings response")))
            }
            Some(got) if got.as_bool() != Some(value) => {
                error!(key, expected = value, got = %got, "Settings write was not applied");
                Err(AbodeError::api(format!(
                    "Set {key} failed: expected {value}, got {got}"
                )))
            }
            Some(_) => {
                info!(key, value, "CMS setting updated");
                Ok(normalize(&echoed))
            }
        }
    }

    async fn get_test_mode(&self) -> Result<bool> {
        if !self.test_mode_supported() {
            return Err(AbodeError::api("Test mode is not supported by this panel"));
        }

        let settings = self.get_settings(None).await?;
        if let Some(active) = settings.get(TEST_MODE_ACTIVE) {
            return Ok(*active);
        }

        if self.inner.settings.any_source_available().await == Some(false) {
            info!("No settings source available, disabling test mode support");
            self.inner.test_mode_supported.store(false, Ordering::SeqCst);
        }
        Ok(false)
    }

    async fn set_test_mode(&self, enabled: bool) -> Result<CmsSettings> {
        match self.set_cms_setting(TEST_MODE_ACTIVE, enabled).await {
            Ok(settings) => {
                info!(enabled, "Test mode updated");
                Ok(settings)
            }
            Err(AbodeError::Api { status, message }) if message.contains(TEST_MODE_ACTIVE) => {
                warn!("Failed to set test mode: {message}");
                Err(AbodeError::Api {
                    status,
                    message: format!("Failed to set test mode: {message}"),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn get_timeline_events(&self, size: u32) -> Result<Vec<Value>> {
        let response = self
            .inner
            .send(ApiRequest::get(urls::timeline_events(size)))
            .await?;
        match response.as_json()? {
            Value::Array(events) => {
                info!(count = events.len(), "Fetched recent timeline events");
                Ok(events)
            }
            other => {
                warn!(response = %other, "Unexpected timeline response format");
                Ok(Vec::new())
            }
        }
    }

    async fn acknowledge_timeline_event(&self, timeline_id: &str) -> Result<bool> {
        let timeline_id = require_timeline_id(timeline_id)?;
        self.process_timeline_event(
            timeline_id,
            urls::timeline_verify_alarm(timeline_id),
            "acknowledged",
        )
        .await
    }

    async fn dismiss_timeline_event(&self, timeline_id: &str) -> Result<bool> {
        let timeline_id = require_timeline_id(timeline_id)?;
        self.process_timeline_event(
            timeline_id,
            urls::timeline_ignore_alarm(timeline_id),
            "dismissed",
        )
        .await
    }

    async fn connection_diagnostics(&self) -> ConnectionDiagnostics {
        let health = self.inner.health.read().await.clone();
        ConnectionDiagnostics {
            status: health.status,
            last_error: health.last_error,
            auth_count: health.auth_count,
            last_auth_at: health.last_auth_at,
            last_success_at: health.last_success_at,
            consecutive_failures: health.consecutive_failures,
            recreation_count: health.recreation_count,
            session_age: self.inner.sessions.age().await,
            session_generation: self.inner.sessions.generation().await,
            authenticated: self.inner.auth.read().await.has_token(),
            client_uuid: self.inner.identity.read().await.uuid.clone(),
            settings_cached: self.inner.settings.is_cached().await,
            test_mode_supported: self.test_mode_supported(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AbodeClient {
        AbodeClient::new(
            ClientConfig::default(),
            Credentials::new("user@example.com", "secret"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_default_mode_validation() {
        let client = client();
        assert_eq!(client.default_mode().await, AlarmMode::Away);
        client.set_default_mode("HOME").await.unwrap();
        assert_eq!(client.default_mode().await, AlarmMode::Home);
        assert!(client.set_default_mode("standby").await.is_err());
        assert_eq!(client.default_mode().await, AlarmMode::Home);
    }

    #[tokio::test]
    async fn test_fresh_client_diagnostics() {
        let client = client();
        let diagnostics = client.connection_diagnostics().await;
        assert_eq!(diagnostics.status, ConnectionStatus::Disconnected);
        assert!(!diagnostics.authenticated);
        assert!(diagnostics.session_generation.is_none());
        assert!(diagnostics.test_mode_supported);
        assert!(!diagnostics.client_uuid.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_is_terminal() {
        let client = client();
        client.shutdown().await;
        assert!(matches!(
            client.send(ApiRequest::get(urls::PANEL)).await,
            Err(AbodeError::Closed)
        ));
    }

    #[rstest::rstest]
    #[case(Some(json!("TIMELINE_EVENT_ALREADY_PROCESSED")), "Bad request", true)]
    #[case(Some(json!("EVENT_NOT_FOUND")), "Event was already removed", false)]
    #[case(Some(json!(1234)), "This event has already been dismissed", true)]
    #[case(None, "Already verified", true)]
    #[case(None, "Event not found", false)]
    fn test_already_processed_prefers_error_code(
        #[case] error_code: Option<Value>,
        #[case] message: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(already_processed(error_code.as_ref(), message), expected);
    }

    #[tokio::test]
    async fn test_blank_timeline_id_rejected() {
        let client = client();
        assert!(matches!(
            client.acknowledge_timeline_event("  ").await,
            Err(AbodeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ClientConfig::default();
        config.retry.max_attempts = 0;
        assert!(AbodeClient::new(config, Credentials::new("a", "b")).is_err());
    }
}
