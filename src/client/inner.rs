//! Shared state behind every [`AbodeClient`](super::AbodeClient) handle

use crate::client::auth::AuthState;
use crate::client::diagnostics::AuthHealth;
use crate::client::models::{AlarmMode, Automation, Device};
use crate::client::session::{MonitorHandle, SessionManager};
use crate::client::settings::SettingsCache;
use crate::config::identity::ClientIdentity;
use crate::config::{ClientConfig, Credentials};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};

/// Device and automation caches filled by the listing calls
#[derive(Debug, Default)]
pub(crate) struct DeviceCache {
    pub(crate) panel: Option<Value>,
    pub(crate) devices: Option<BTreeMap<String, Device>>,
    pub(crate) automations: Option<BTreeMap<String, Automation>>,
}

pub(crate) struct ClientInner {
    pub(crate) self_ref: Weak<ClientInner>,
    pub(crate) config: ClientConfig,
    pub(crate) credentials: Credentials,
    pub(crate) sessions: SessionManager,
    pub(crate) auth: RwLock<AuthState>,
    pub(crate) login_lock: Mutex<()>,
    pub(crate) health: RwLock<AuthHealth>,
    pub(crate) settings: SettingsCache,
    pub(crate) identity: RwLock<ClientIdentity>,
    pub(crate) cache: RwLock<DeviceCache>,
    pub(crate) default_mode: RwLock<AlarmMode>,
    pub(crate) test_mode_supported: AtomicBool,
    pub(crate) monitor: std::sync::Mutex<Option<MonitorHandle>>,
}

impl ClientInner {
    pub(crate) fn new(
        config: ClientConfig,
        credentials: Credentials,
        identity: ClientIdentity,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            config,
            credentials,
            sessions: SessionManager::new(),
            auth: RwLock::new(AuthState::default()),
            login_lock: Mutex::new(()),
            health: RwLock::new(AuthHealth::default()),
            settings: SettingsCache::new(),
            identity: RwLock::new(identity),
            cache: RwLock::new(DeviceCache::default()),
            default_mode: RwLock::new(AlarmMode::Away),
            test_mode_supported: AtomicBool::new(true),
            monitor: std::sync::Mutex::new(None),
        })
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let monitor = self.monitor.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(monitor) = monitor.as_ref() {
            monitor.cancel();
        }
    }
}
