//! Client configuration
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `ABODE_*` environment variables (`__` separates nested keys, e.g.
//! `ABODE_RETRY__MAX_ATTEMPTS=5`).

pub mod identity;

use crate::error::{AbodeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Production API host
pub const DEFAULT_BASE_URL: &str = "https://my.goabode.com";

/// Complete client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API host, without a trailing path
    pub base_url: Url,

    /// Per-request timeouts
    pub timeouts: TimeoutConfig,

    /// Connection pool bounds
    pub pool: PoolConfig,

    /// Retry and backoff tuning
    pub retry: RetryConfig,

    /// Session lifetime management
    pub session: SessionConfig,

    /// Default freshness window of the CMS settings cache
    #[serde(with = "humantime_serde")]
    pub settings_ttl: Duration,

    /// Where the client correlation id is persisted; in-memory when unset
    pub identity_path: Option<PathBuf>,
}

/// Per-request timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(with = "humantime_serde")]
    pub total: Duration,
    #[serde(with = "humantime_serde")]
    pub connect: Duration,
    #[serde(with = "humantime_serde")]
    pub read: Duration,
}

/// Connection pool bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrent requests on one session
    pub max_connections: usize,
    /// Idle connections kept per host
    pub max_idle_per_host: usize,
}

/// Retry and backoff tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, first try included
    pub max_attempts: u32,
    /// First connection-failure backoff
    #[serde(with = "humantime_serde")]
    pub backoff_seed: Duration,
    /// Upper bound of the connection-failure backoff
    #[serde(with = "humantime_serde")]
    pub backoff_cap: Duration,
    /// Minimum wait after an HTTP 429
    #[serde(with = "humantime_serde")]
    pub rate_limit_floor: Duration,
    /// Upper bound of the doubling wait for repeated 429s
    #[serde(with = "humantime_serde")]
    pub rate_limit_cap: Duration,
    /// Consecutive connection failures that trigger a session recreation
    pub failure_threshold: u32,
}

/// Session lifetime management
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions older than this are recreated. The service drops idle
    /// sessions after roughly an hour.
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
    /// How often the background monitor checks the session age
    #[serde(with = "humantime_serde")]
    pub monitor_interval: Duration,
    /// Run the background monitor at all
    pub monitor_enabled: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            timeouts: TimeoutConfig::default(),
            pool: PoolConfig::default(),
            retry: RetryConfig::default(),
            session: SessionConfig::default(),
            settings_ttl: Duration::from_secs(300),
            identity_path: None,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            total: Duration::from_secs(30),
            connect: Duration::from_secs(10),
            read: Duration::from_secs(10),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            max_idle_per_host: 5,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_seed: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            rate_limit_floor: Duration::from_secs(30),
            rate_limit_cap: Duration::from_secs(300),
            failure_threshold: 3,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(1800),
            monitor_interval: Duration::from_secs(60),
            monitor_enabled: true,
        }
    }
}

impl ClientConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ABODE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Persist the client identity under the home directory unless a path
    /// was configured
    pub fn with_default_identity_path(mut self) -> Self {
        if self.identity_path.is_none() {
            self.identity_path = Some(identity::ClientIdentity::default_path());
        }
        self
    }

    /// Point the client at another host (mock servers, staging)
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = Url::parse(base_url)?;
        Ok(self)
    }

    /// Reject configurations the client cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(AbodeError::config("retry.max_attempts must be at least 1"));
        }
        if self.pool.max_connections == 0 {
            return Err(AbodeError::config("pool.max_connections must be at least 1"));
        }
        if self.session.monitor_interval.is_zero() {
            return Err(AbodeError::config("session.monitor_interval must be non-zero"));
        }
        if self.retry.rate_limit_floor < self.retry.backoff_cap {
            return Err(AbodeError::config(format!(
                "retry.rate_limit_floor ({:?}) must not be below retry.backoff_cap ({:?})",
                self.retry.rate_limit_floor, self.retry.backoff_cap
            )));
        }
        if self.retry.rate_limit_cap < self.retry.rate_limit_floor {
            return Err(AbodeError::config(
                "retry.rate_limit_cap must not be below retry.rate_limit_floor",
            ));
        }
        if self.timeouts.connect > self.timeouts.total {
            return Err(AbodeError::config(
                "timeouts.connect must not exceed timeouts.total",
            ));
        }
        match self.base_url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(AbodeError::config(format!(
                "base_url must be http or https, got {other}"
            ))),
        }
    }

    /// Build an absolute URL for an API path
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AbodeError::invalid_input(format!("Invalid URL path {path}: {e}")))
    }
}

/// Account credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
