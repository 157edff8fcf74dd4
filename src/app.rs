use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::InboxError;
use crate::live::LiveConfig;
use crate::store::ClosedConversationPolicy;

pub const CONFIG_ENV: &str = "INBOX_SYNC_CONFIG";

fn default_locale() -> String {
    "ru_RU".to_string()
}

fn default_reconnect_base() -> u64 {
    1
}

fn default_reconnect_max() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppState {
    pub base_url: String,
    /// Websocket endpoint; derived from `base_url` when unset.
    #[serde(default)]
    pub socket_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub operator_email: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub closed_conversation_policy: ClosedConversationPolicy,
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base_secs: u64,
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_secs: u64,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            socket_url: None,
            token: None,
            project_id: String::new(),
            operator_email: String::new(),
            locale: default_locale(),
            closed_conversation_policy: ClosedConversationPolicy::default(),
            reconnect_base_secs: default_reconnect_base(),
            reconnect_max_secs: default_reconnect_max(),
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    // `INBOX_SYNC_CONFIG` wins over the platform config dir
    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("inbox-sync.toml"))
    }

    pub fn load() -> Result<Self, InboxError> {
        let path = Self::config_path().ok_or_else(|| InboxError::Config("no config dir".into()))?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, InboxError> {
        let text = fs::read_to_string(path)
            .map_err(|e| InboxError::Config(format!("cannot read {}: {e}", path.display())))?;
        let state: AppState = toml::from_str(&text)
            .map_err(|e| InboxError::Config(format!("invalid {}: {e}", path.display())))?;
        state.validate()?;
        Ok(state)
    }

    pub fn validate(&self) -> Result<(), InboxError> {
        if self.base_url.trim().is_empty() {
            return Err(InboxError::Config("base_url is required".into()));
        }
        if self.project_id.trim().is_empty() {
            return Err(InboxError::Config("project_id is required".into()));
        }
        if self.reconnect_base_secs == 0 || self.reconnect_max_secs < self.reconnect_base_secs {
            return Err(InboxError::Config("reconnect delays must satisfy 0 < base <= max".into()));
        }
        Ok(())
    }

    pub fn save(&self) -> std::io::Result<()> {
        match Self::config_path() {
            Some(path) => self.save_to(&path),
            None => Err(std::io::Error::new(std::io::ErrorKind::NotFound, "No config dir")),
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self).map_err(|e| std::io::Error::other(e.to_string()))?;
        fs::write(path, toml)
    }

    pub fn socket_url(&self) -> String {
        match &self.socket_url {
            Some(url) if !url.trim().is_empty() => url.clone(),
            _ => crate::utils::socket_url(&self.base_url),
        }
    }

    pub fn chrono_locale(&self) -> chrono::Locale {
        chrono::Locale::try_from(self.locale.as_str()).unwrap_or_else(|_| {
            log::warn!("unknown locale {}, falling back to en_US", self.locale);
            chrono::Locale::en_US
        })
    }

    pub fn live_config(&self) -> LiveConfig {
        LiveConfig {
            url: self.socket_url(),
            project_id: Some(self.project_id.clone()),
            reconnect_base_delay: Duration::from_secs(self.reconnect_base_secs),
            reconnect_max_delay: Duration::from_secs(self.reconnect_max_secs),
        }
    }
}
