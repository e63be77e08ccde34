//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the identity provider URL, request timeout, where the
//! session is persisted, display locale and the last used email.
//!
//! Configuration is stored at `~/.config/adminpanel/config.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::api::HttpIdentityProvider;
use crate::auth::{FileSessionStore, KeyringSessionStore, Locale, SessionContext, SessionStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "adminpanel";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_BASE_URL: &str = "http://localhost:7272";

/// Environment variable overriding `base_url`
pub const ENV_BASE_URL: &str = "ADMINPANEL_BASE_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub store: StoreBackend,
    pub locale: Locale,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            store: StoreBackend::default(),
            locale: Locale::default(),
            last_email: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment overrides on top of the file values
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_store(&self) -> Result<Arc<dyn SessionStore>> {
        Ok(match self.store {
            StoreBackend::File => Arc::new(FileSessionStore::new(&self.data_dir()?)),
            StoreBackend::Keyring => Arc::new(KeyringSessionStore::new()),
        })
    }

    /// Wire a session context to the configured provider and store.
    /// The context starts unauthenticated; call `initialize` to restore.
    pub fn session_context(&self) -> Result<SessionContext> {
        let provider = HttpIdentityProvider::with_timeout(&self.base_url, self.request_timeout())
            .context("Failed to build HTTP client")?;
        Ok(SessionContext::new(
            self.session_store()?,
            Arc::new(provider),
            self.request_timeout(),
        ))
    }
}
