//! Dashboard configuration.
//!
//! Read from `~/.config/queue-dashboard/config.toml` (or `--config`). Every
//! section is optional; a missing file means all defaults. Command-line flags
//! are applied on top in `main`.
//!
//! ```toml
//! [server]
//! url = "http://localhost:5000"
//! event = "fila_atualizada"
//!
//! [theme]
//! priority = [[0.8, 0.2, 0.18, 1.0], [0.85, 0.6, 0.1, 1.0]]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::renderer::UPDATE_EVENT;
use crate::theme::Theme;

const APP_NAME: &str = "queue-dashboard";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub server: ServerConfig,
    pub window: WindowConfig,
    pub theme: Theme,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the Socket.IO server, `http(s)://` or `ws(s)://`.
    pub url: String,
    pub path: String,
    pub namespace: String,
    /// Name of the queue update event.
    pub event: String,
    pub reconnect_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000".to_string(),
            path: "socket.io".to_string(),
            namespace: "/".to_string(),
            event: UPDATE_EVENT.to_string(),
            reconnect_secs: 3,
        }
    }
}

impl ServerConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub windowed: bool,
}

impl DashboardConfig {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Load `explicit` if given (it must exist), otherwise the default path
    /// if present, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match default_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config {}", path.display()))
    }
}

/// `$XDG_CONFIG_HOME/queue-dashboard/config.toml`, else under `~/.config`.
pub fn default_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

fn config_dir() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join(APP_NAME));
    }
    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".config").join(APP_NAME))
}
