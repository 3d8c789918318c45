//! Persisted client identity
//!
//! The service recognises repeat clients by the `uuid` sent with every login.
//! It has to survive restarts, so it lives in a small JSON file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{AbodeError, Result};

/// Client correlation identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientIdentity {
    /// Correlation id sent with every login
    pub uuid: String,
    /// When the identity was minted
    pub created_at: DateTime<Utc>,
    /// Last successful login
    pub last_login: Option<DateTime<Utc>>,
}

impl ClientIdentity {
    /// Mint a fresh identity
    pub fn generate() -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            last_login: None,
        }
    }

    /// Default identity file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".abode-client")
            .join("identity.json")
    }

    /// Load identity from file
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|e| {
            AbodeError::config(format!("Failed to read client identity {}: {e}", path.display()))
        })?;

        let identity = serde_json::from_str(&content).map_err(|e| {
            AbodeError::config(format!("Failed to parse client identity {}: {e}", path.display()))
        })?;

        Ok(Some(identity))
    }

    /// Load the stored identity, or mint and store a new one
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if let Some(identity) = Self::load(path)? {
            return Ok(identity);
        }

        let identity = Self::generate();
        identity.save(path)?;
        tracing::info!(path = %path.display(), "Created new client identity");
        Ok(identity)
    }

    /// Save identity to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AbodeError::config(format!("Failed to create identity directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;

        fs::write(path, content).map_err(|e| {
            AbodeError::config(format!("Failed to write client identity {}: {e}", path.display()))
        })?;

        Ok(())
    }

    /// Stamp a successful login
    pub fn mark_login(&mut self) {
        self.last_login = Some(Utc::now());
    }
}
