//! Roozbot configuration system.
//!
//! TOML file at `~/.roozbot/config.toml`, with environment overrides for the
//! values that usually come from a deployment environment:
//! `TELEGRAM_BOT_TOKEN`, `ROOZBOT_DATA_DIR`, `ROOZBOT_INITIAL_ADMIN`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, RoozError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub telegram: TelegramSettings,
    /// Directory holding the JSON store, one file per record.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Telegram credentials and polling cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn default_poll_interval() -> u64 {
    1
}

fn default_data_dir() -> PathBuf {
    BotConfig::home_dir().join("data")
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramSettings::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl BotConfig {
    /// Load config from the default path, falling back to defaults when the
    /// file does not exist. Environment overrides are applied either way.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path (no env overrides).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RoozError::Config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RoozError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN")
            && !token.is_empty()
        {
            self.telegram.bot_token = token;
        }
        if let Ok(dir) = std::env::var("ROOZBOT_DATA_DIR")
            && !dir.is_empty()
        {
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// The bootstrap administrator identity, if configured in the
    /// environment. Only consulted when the stored admin list is empty.
    pub fn initial_admin() -> Option<i64> {
        std::env::var("ROOZBOT_INITIAL_ADMIN")
            .ok()
            .and_then(|v| v.trim().parse().ok())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the roozbot home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".roozbot")
    }
}
