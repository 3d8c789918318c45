//! Abode REST endpoints, relative to the configured base URL

pub const LOGIN: &str = "/api/auth2/login";
pub const LOGOUT: &str = "/api/v1/logout";
pub const OAUTH_TOKEN: &str = "/api/auth2/claims";

pub const PANEL: &str = "/api/v1/panel";
pub const DEVICES: &str = "/api/v1/devices";
pub const AUTOMATION: &str = "/integrations/v1/automations/";
pub const TIMELINE: &str = "/api/v1/timeline";

pub const SETTINGS: &str = "/api/v1/panel/setting";
pub const AREAS: &str = "/api/v1/areas";
pub const SOUNDS: &str = "/api/v1/sounds";
pub const SIREN: &str = "/api/v1/siren";

/// Dedicated CMS settings resource
pub const CMS_SETTINGS: &str = "/integrations/v1/cms/settings";
/// Security panel resource, carries CMS settings under `attributes.cms`
pub const SECURITY_PANEL: &str = "/integrations/v1/security-panel";

pub fn timeline_verify_alarm(timeline_id: &str) -> String {
    format!("{TIMELINE}/{timeline_id}/verify_alarm")
}

pub fn timeline_ignore_alarm(timeline_id: &str) -> String {
    format!("{TIMELINE}/{timeline_id}/ignore_alarm")
}

pub fn timeline_events(size: u32) -> String {
    format!("{TIMELINE}?size={size}")
}
