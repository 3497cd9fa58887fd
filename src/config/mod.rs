//! Persisted integration configuration.
//!
//! A flat JSON file owned by the external setup flow and consumed here:
//! server address, polling cadence and the configured player list. A
//! missing file means "not configured yet", never an error. `LMS_HOST` /
//! `LMS_PORT` environment variables override the stored server address
//! (used when the bridge is launched next to the server itself).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::gateway::DEFAULT_PORT;

const CONFIG_FILE: &str = "config.json";

/// One configured player row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub player_id: String,
    pub name: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_model() -> String {
    "unknown".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Bridge configuration as persisted by the setup flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,
    /// Poll cadence in seconds while a player is playing.
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,
    #[serde(default)]
    pub players: Vec<PlayerConfig>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_polling_interval() -> u64 {
    2
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            server_host: String::new(),
            server_port: default_port(),
            polling_interval: default_polling_interval(),
            players: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Complete enough to build entities: a server address and at least one
    /// configured player.
    pub fn is_configured(&self) -> bool {
        !self.server_host.is_empty() && !self.players.is_empty()
    }

    pub fn enabled_players(&self) -> impl Iterator<Item = &PlayerConfig> {
        self.players.iter().filter(|p| p.enabled)
    }
}

/// Config directory (env override or platform default).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LYRION_BRIDGE_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library/Application Support/lyrion-bridge");
        }
    }

    #[cfg(not(target_os = "macos"))]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("lyrion-bridge");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".config/lyrion-bridge");
        }
    }

    PathBuf::from(".")
}

pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Load configuration from disk, then apply env overrides. Missing or
/// unreadable files yield the default (unconfigured) config.
pub fn load() -> BridgeConfig {
    let path = config_file_path();

    let mut config = match std::fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str::<BridgeConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                BridgeConfig::default()
            }
        },
        Err(_) => {
            info!(
                "No configuration file at {}, starting unconfigured",
                path.display()
            );
            BridgeConfig::default()
        }
    };

    if let Ok(host) = std::env::var("LMS_HOST") {
        config.server_host = host;
    }
    if let Ok(port) = std::env::var("LMS_PORT") {
        if let Ok(port) = port.parse::<u16>() {
            config.server_port = port;
        }
    }

    config
}

/// Persist configuration for the setup flow.
pub fn save(config: &BridgeConfig) -> Result<()> {
    let path = config_file_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    info!("Saved configuration to {}", path.display());
    Ok(())
}
