//! CMS settings cache
//!
//! Central monitoring settings come from two sources of differing
//! reliability: the dedicated settings resource and the `attributes.cms`
//! block of the security panel resource. Both are read, normalized to
//! canonical camelCase keys and merged with the dedicated resource winning.
//!
//! Fetches are single-flight. A write anywhere in the client invalidates the
//! cache so the next read returns ground truth.

use crate::client::executor::ApiRequest;
use crate::client::inner::ClientInner;
use crate::client::urls;
use crate::error::{AbodeError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Normalized settings: canonical key to flag
pub type CmsSettings = BTreeMap<String, bool>;

pub const MONITORING_ACTIVE: &str = "monitoringActive";
pub const TEST_MODE_ACTIVE: &str = "testModeActive";
pub const SEND_MEDIA: &str = "sendMedia";
pub const DISPATCH_WITHOUT_VERIFICATION: &str = "dispatchWithoutVerification";
pub const DISPATCH_POLICE: &str = "dispatchPolice";
pub const DISPATCH_FIRE: &str = "dispatchFire";
pub const DISPATCH_MEDICAL: &str = "dispatchMedical";

/// Known toggles in their canonical spelling
pub const CANONICAL_KEYS: [&str; 7] = [
    MONITORING_ACTIVE,
    TEST_MODE_ACTIVE,
    SEND_MEDIA,
    DISPATCH_WITHOUT_VERIFICATION,
    DISPATCH_POLICE,
    DISPATCH_FIRE,
    DISPATCH_MEDICAL,
];

fn fold(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn camel_case(key: &str) -> String {
    let mut parts = key.split(['_', '-']).filter(|p| !p.is_empty());
    let Some(first) = parts.next() else {
        return String::new();
    };

    let mut out = String::with_capacity(key.len());
    let mut chars = first.chars();
    if let Some(c) = chars.next() {
        out.extend(c.to_lowercase());
        out.push_str(chars.as_str());
    }
    for part in parts {
        let mut chars = part.chars();
        if let Some(c) = chars.next() {
            out.extend(c.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
        }
    }
    out
}

/// Canonical spelling of a settings key.
///
/// `send_media`, `sendmedia` and `sendMedia` all become `sendMedia`. Keys
/// outside the known set are camel-cased.
pub fn normalize_key(key: &str) -> String {
    let folded = fold(key);
    CANONICAL_KEYS
        .iter()
        .find(|canonical| canonical.to_lowercase() == folded)
        .map(|canonical| canonical.to_string())
        .unwrap_or_else(|| camel_case(key))
}

/// Normalize one raw source, keeping only boolean values
pub fn normalize(raw: &Map<String, Value>) -> CmsSettings {
    raw.iter()
        .filter_map(|(key, value)| value.as_bool().map(|flag| (normalize_key(key), flag)))
        .collect()
}

/// Merge two normalized sources; `primary` wins on overlapping keys
pub fn merge(primary: CmsSettings, fallback: CmsSettings) -> CmsSettings {
    let mut merged = fallback;
    merged.extend(primary);
    merged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Primary,
    Fallback,
}

impl Source {
    fn path(self) -> &'static str {
        match self {
            Source::Primary => urls::CMS_SETTINGS,
            Source::Fallback => urls::SECURITY_PANEL,
        }
    }

    fn extract(self, body: &Value) -> Option<&Map<String, Value>> {
        match self {
            Source::Primary => body
                .get("cms")
                .and_then(Value::as_object)
                .or_else(|| body.as_object()),
            Source::Fallback => body.pointer("/attributes/cms").and_then(Value::as_object),
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Primary => write!(f, "cms settings"),
            Source::Fallback => write!(f, "security panel"),
        }
    }
}

struct CacheEntry {
    settings: CmsSettings,
    fetched_at: Instant,
    any_source_available: bool,
}

/// Cached merged settings with single-flight refresh
#[derive(Default)]
pub struct SettingsCache {
    entry: RwLock<Option<CacheEntry>>,
    seed: RwLock<Option<CmsSettings>>,
    fetch_lock: Mutex<()>,
    epoch: AtomicU64,
    fetch_count: AtomicU64,
    fetched_once: AtomicBool,
}

impl SettingsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached settings younger than `ttl`
    pub async fn fresh(&self, ttl: Duration) -> Option<CmsSettings> {
        self.entry
            .read()
            .await
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < ttl)
            .map(|entry| entry.settings.clone())
    }

    pub async fn is_cached(&self) -> bool {
        self.entry.read().await.is_some()
    }

    /// Whether the last completed fetch reached at least one source
    pub async fn any_source_available(&self) -> Option<bool> {
        self.entry
            .read()
            .await
            .as_ref()
            .map(|entry| entry.any_source_available)
    }

    /// Network fetches started so far
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Drop the cached entry. Fetches already in flight will not store
    /// their result.
    pub async fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.entry.write().await.take().is_some() {
            debug!("Settings cache invalidated");
        }
    }

    /// Drop the cached entry without touching in-flight fetches. Used when
    /// the session is replaced: a fetch that recovered through the new
    /// session still holds current data.
    pub async fn clear(&self) {
        if self.entry.write().await.take().is_some() {
            debug!("Settings cache cleared");
        }
    }

    /// Settings from the login response, used only until the first fetch
    /// completes
    pub async fn seed(&self, raw: &Map<String, Value>) {
        if self.fetched_once.load(Ordering::SeqCst) {
            return;
        }
        *self.seed.write().await = Some(normalize(raw));
    }

    async fn grace(&self) -> Option<CmsSettings> {
        if self.fetched_once.load(Ordering::SeqCst) {
            return None;
        }
        self.seed.read().await.clone()
    }

    async fn store(&self, epoch: u64, settings: CmsSettings, any_source_available: bool) {
        self.fetched_once.store(true, Ordering::SeqCst);
        self.seed.write().await.take();

        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Settings changed while fetching, not caching the result");
            return;
        }
        *self.entry.write().await = Some(CacheEntry {
            settings,
            fetched_at: Instant::now(),
            any_source_available,
        });
    }
}

impl ClientInner {
    /// Merged settings, fetched when the cache is older than `ttl`
    pub(crate) async fn get_settings(&self, ttl: Duration) -> Result<CmsSettings> {
        if let Some(settings) = self.settings.fresh(ttl).await {
            return Ok(settings);
        }

        let _guard = self.settings.fetch_lock.lock().await;
        if let Some(settings) = self.settings.fresh(ttl).await {
            debug!("Settings refreshed by a concurrent fetch");
            return Ok(settings);
        }

        let epoch = self.settings.epoch.load(Ordering::SeqCst);
        self.settings.fetch_count.fetch_add(1, Ordering::SeqCst);

        let primary = self.fetch_settings_source(Source::Primary).await;
        let fallback = self.fetch_settings_source(Source::Fallback).await;

        let (primary, fallback) = match (primary, fallback) {
            (Err(primary), Err(fallback)) => {
                if let Some(seed) = self.settings.grace().await {
                    warn!(
                        "Both settings sources failed ({primary}; {fallback}), serving login snapshot"
                    );
                    return Ok(seed);
                }
                return Err(primary);
            }
            (primary, fallback) => (primary, fallback),
        };

        let any_source_available = matches!(primary, Ok(Some(_))) || matches!(fallback, Ok(Some(_)));
        let primary = unwrap_source(Source::Primary, primary);
        let fallback = unwrap_source(Source::Fallback, fallback);

        let merged = merge(primary, fallback);
        debug!(keys = merged.len(), any_source_available, "Settings fetched");
        self.settings
            .store(epoch, merged.clone(), any_source_available)
            .await;
        Ok(merged)
    }

    /// Read one source. `Ok(None)` means the source answered with an error
    /// status or an unusable body.
    async fn fetch_settings_source(&self, source: Source) -> Result<Option<CmsSettings>> {
        let mut recreated = false;
        loop {
            let generation = self.sessions.generation().await;
            let request = ApiRequest::get(source.path()).raise_on_error(false);

            match self.send(request).await {
                Ok(response) if !response.is_success() => {
                    debug!(
                        %source,
                        status = response.status().as_u16(),
                        "Settings source unavailable"
                    );
                    return Ok(None);
                }
                Ok(response) => {
                    let body = response.as_json_or_text();
                    return match source.extract(&body) {
                        Some(raw) => Ok(Some(normalize(raw))),
                        None => {
                            warn!(%source, "Settings source returned an unexpected document");
                            Ok(None)
                        }
                    };
                }
                Err(AbodeError::SessionExpired { .. }) if !recreated => {
                    info!(%source, "Settings source returned an empty body, recreating session");
                    recreated = true;
                    if let Err(e) = self.recreate_session(generation, "empty settings response").await {
                        warn!("Session recreation for settings failed: {e}");
                    }
                }
                Err(AbodeError::SessionExpired { .. }) => {
                    warn!(%source, "Settings source still empty after session recreation");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn unwrap_source(source: Source, result: Result<Option<CmsSettings>>) -> CmsSettings {
    match result {
        Ok(settings) => settings.unwrap_or_default(),
        Err(e) => {
            warn!(%source, "Settings source failed: {e}");
            CmsSettings::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("send_media", "sendMedia")]
    #[case("sendmedia", "sendMedia")]
    #[case("sendMedia", "sendMedia")]
    #[case("SEND_MEDIA", "sendMedia")]
    #[case("test_mode_active", "testModeActive")]
    #[case("monitoringactive", "monitoringActive")]
    #[case("dispatch_without_verification", "dispatchWithoutVerification")]
    #[case("dispatch_police", "dispatchPolice")]
    #[case("dispatchFire", "dispatchFire")]
    #[case("dispatch_medical", "dispatchMedical")]
    #[case("video_verification", "videoVerification")]
    #[case("alreadyCamel", "alreadyCamel")]
    fn test_normalize_key(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_key(raw), expected);
    }

    #[test]
    fn test_normalize_drops_non_boolean_values() {
        let raw = json!({
            "send_media": true,
            "monitoringActive": false,
            "contact_name": "Alice",
            "level": 3,
        });
        let settings = normalize(raw.as_object().unwrap());
        assert_eq!(
            settings,
            CmsSettings::from([
                ("monitoringActive".to_string(), false),
                ("sendMedia".to_string(), true),
            ])
        );
    }

    #[test]
    fn test_merge_prefers_primary() {
        let primary = CmsSettings::from([("testModeActive".to_string(), true)]);
        let fallback = CmsSettings::from([
            ("testModeActive".to_string(), false),
            ("sendMedia".to_string(), true),
        ]);
        let merged = merge(primary, fallback);
        assert_eq!(merged.get("testModeActive"), Some(&true));
        assert_eq!(merged.get("sendMedia"), Some(&true));
    }

    #[test]
    fn test_source_extraction() {
        let panel = json!({"attributes": {"cms": {"sendMedia": true}}});
        assert!(Source::Fallback.extract(&panel).is_some());
        assert!(Source::Fallback.extract(&json!({"attributes": {}})).is_none());

        let flat = json!({"testModeActive": false});
        assert!(Source::Primary.extract(&flat).is_some());
        let nested = json!({"cms": {"testModeActive": false}});
        assert_eq!(
            Source::Primary.extract(&nested).unwrap().get("testModeActive"),
            Some(&json!(false))
        );
    }

    #[tokio::test]
    async fn test_invalidate_discards_in_flight_store() {
        let cache = SettingsCache::new();
        let epoch = cache.epoch.load(Ordering::SeqCst);
        cache.invalidate().await;
        cache
            .store(epoch, CmsSettings::from([("sendMedia".to_string(), true)]), true)
            .await;
        assert!(!cache.is_cached().await);
        assert!(cache.grace().await.is_none(), "a completed fetch ends the grace period");
    }

    #[tokio::test]
    async fn test_clear_keeps_in_flight_store() {
        let cache = SettingsCache::new();
        let epoch = cache.epoch.load(Ordering::SeqCst);
        cache.clear().await;
        cache
            .store(epoch, CmsSettings::from([("sendMedia".to_string(), true)]), true)
            .await;
        assert!(cache.is_cached().await);
    }

    #[tokio::test]
    async fn test_seed_only_before_first_fetch() {
        let cache = SettingsCache::new();
        let raw = json!({"send_media": true});
        cache.seed(raw.as_object().unwrap()).await;
        assert_eq!(
            cache.grace().await,
            Some(CmsSettings::from([("sendMedia".to_string(), true)]))
        );
        // the seed is never served as a fresh entry
        assert!(cache.fresh(Duration::from_secs(300)).await.is_none());

        let epoch = cache.epoch.load(Ordering::SeqCst);
        cache.store(epoch, CmsSettings::new(), true).await;
        cache.seed(raw.as_object().unwrap()).await;
        assert!(cache.grace().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = SettingsCache::new();
        cache
            .store(0, CmsSettings::from([("sendMedia".to_string(), true)]), true)
            .await;
        assert!(cache.fresh(Duration::from_secs(300)).await.is_some());
        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(cache.fresh(Duration::from_secs(300)).await.is_none());
        assert!(cache.is_cached().await);
    }
}
