//! Connection health counters and the diagnostics snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Coarse connection state shown to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
    RateLimited,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::RateLimited => write!(f, "rate_limited"),
        }
    }
}

/// Counters accumulated for the lifetime of a client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthHealth {
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub auth_count: u64,
    pub last_auth_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub recreation_count: u64,
}

impl AuthHealth {
    pub fn set_status(&mut self, status: ConnectionStatus, error: Option<String>) {
        self.status = status;
        self.last_error = error;
    }

    pub fn record_auth(&mut self) {
        self.auth_count += 1;
        self.last_auth_at = Some(Utc::now());
        self.set_status(ConnectionStatus::Connected, None);
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_success_at = Some(Utc::now());
        self.set_status(ConnectionStatus::Connected, None);
    }

    /// Count a connection-level failure and return the new streak length
    pub fn record_failure(&mut self, error: &str) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.to_string());
        self.consecutive_failures
    }

    pub fn record_recreation(&mut self) {
        self.recreation_count += 1;
    }
}

/// Read-only view of the client connection state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDiagnostics {
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub auth_count: u64,
    pub last_auth_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub recreation_count: u64,
    #[serde(with = "humantime_serde")]
    pub session_age: Option<Duration>,
    pub session_generation: Option<u64>,
    pub authenticated: bool,
    pub client_uuid: String,
    pub settings_cached: bool,
    pub test_mode_supported: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_resets_failure_streak() {
        let mut health = AuthHealth::default();
        assert_eq!(health.record_failure("timeout"), 1);
        assert_eq!(health.record_failure("timeout"), 2);
        health.record_success();
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.status, ConnectionStatus::Connected);
        assert!(health.last_error.is_none());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_value(ConnectionStatus::RateLimited).unwrap();
        assert_eq!(json, "rate_limited");
        assert_eq!(ConnectionStatus::Disconnected.to_string(), "disconnected");
    }
}
