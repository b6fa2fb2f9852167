//! Configuration loading and persistence.
//!
//! Handles reading and writing the core-chat configuration file. The
//! bridge endpoint is deliberately explicit configuration rather than a
//! process-wide constant: it is loaded here and passed into
//! `Session::connect` by the caller.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::ws::http_to_ws_scheme;

/// Configuration for the core-chat client.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// WebSocket endpoint of the Core bridge.
    pub endpoint: String,
    /// Channel to subscribe to for assistant responses.
    pub channel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:9877/ws".to_string(),
            channel: "claude".to_string(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `CORE_CHAT_CONFIG_DIR` env var: explicit override (tests use this)
    /// 2. Default: platform config dir (macOS: ~/Library/Application Support/core-chat)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(override_dir) = std::env::var("CORE_CHAT_CONFIG_DIR") {
            PathBuf::from(override_dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("core-chat")
        };

        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        Ok(dir)
    }

    /// Path to the configuration file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load configuration, falling back to defaults when no file exists.
    ///
    /// The `CORE_CHAT_ENDPOINT` env var overrides the stored endpoint.
    /// HTTP(S) endpoints are normalized to WS(S).
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(endpoint) = std::env::var("CORE_CHAT_ENDPOINT") {
            config.endpoint = endpoint;
        }
        config.endpoint = http_to_ws_scheme(&config.endpoint);
        Ok(config)
    }

    /// Persist configuration to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config: {}", path.display()))
    }
}
