//! Resilient async client for the Abode cloud security service
//!
//! The client keeps one HTTP session alive across the service's idle
//! timeouts, rate limits and flaky connectivity:
//!
//! - sessions are recreated before the server drops them and after repeated
//!   connection failures
//! - every request is retried with backoff, and HTTP 429 is honoured
//! - CMS settings are merged from two endpoints and cached with
//!   single-flight refresh
//!
//! ```no_run
//! use abode_client::{AbodeApi, AbodeClient, ClientConfig, Credentials};
//!
//! # async fn run() -> abode_client::Result<()> {
//! let client = AbodeClient::new(
//!     ClientConfig::load(None)?,
//!     Credentials::new("user@example.com", "password"),
//! )?;
//! client.login().await?;
//! let settings = client.get_cms_settings().await?;
//! println!("test mode: {:?}", settings.get("testModeActive"));
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod logging;

pub use client::{AbodeApi, AbodeClient, ApiRequest, ApiResponse, CmsSettings, ConnectionDiagnostics};
pub use config::{ClientConfig, Credentials};
pub use error::{AbodeError, Result};
