//! Abode cloud client
//!
//! [`AbodeClient`] is the entry point. It owns one HTTP session, logs in on
//! demand, retries transient failures and caches the CMS settings. The
//! [`AbodeApi`] trait exposes the operations consumers call, so integrations
//! can be tested against fakes.

pub mod abode_client;
pub mod auth;
pub mod diagnostics;
pub mod executor;
pub(crate) mod inner;
pub mod models;
pub mod panel_settings;
pub mod response;
pub mod retry;
pub mod session;
pub mod settings;
pub mod urls;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub use abode_client::AbodeClient;
pub use diagnostics::{AuthHealth, ConnectionDiagnostics, ConnectionStatus};
pub use executor::ApiRequest;
pub use models::{Alarm, AlarmMode, Automation, Device};
pub use response::ApiResponse;
pub use settings::CmsSettings;

/// Operations of the Abode cloud service
#[async_trait]
pub trait AbodeApi: Send + Sync {
    /// Log in with the configured credentials
    async fn login(&self) -> Result<()>;

    /// Log in with a one-time code after [`AbodeApi::login`] reported that
    /// a second factor is required
    async fn login_with_mfa(&self, mfa_code: &str) -> Result<()>;

    /// End the server-side session
    async fn logout(&self) -> Result<()>;

    /// Devices, optionally restricted to one generic type
    async fn get_devices(&self, refresh: bool, generic_type: Option<&str>) -> Result<Vec<Device>>;

    async fn get_device(&self, device_id: &str, refresh: bool) -> Result<Option<Device>>;

    /// Panel of the given area as an alarm device
    async fn get_alarm(&self, area: &str) -> Result<Alarm>;

    async fn get_automations(&self, refresh: bool) -> Result<Vec<Automation>>;

    /// Change a system setting
    async fn set_setting(&self, name: &str, value: &str, area: &str) -> Result<Value>;

    /// Merged CMS settings, fetched when older than `ttl`
    async fn get_settings(&self, ttl: Option<Duration>) -> Result<CmsSettings>;

    async fn get_cms_settings(&self) -> Result<CmsSettings>;

    async fn set_cms_setting(&self, key: &str, value: bool) -> Result<CmsSettings>;

    async fn get_test_mode(&self) -> Result<bool>;

    async fn set_test_mode(&self, enabled: bool) -> Result<CmsSettings>;

    async fn get_timeline_events(&self, size: u32) -> Result<Vec<Value>>;

    async fn acknowledge_timeline_event(&self, timeline_id: &str) -> Result<bool>;

    async fn dismiss_timeline_event(&self, timeline_id: &str) -> Result<bool>;

    async fn connection_diagnostics(&self) -> ConnectionDiagnostics;
}
