//! Configuration for shellterm.
//!
//! Settings are read from `~/.shellterm/config.toml`. A missing or
//! unreadable file means defaults; command-line flags are applied on top.
//!
//! ```toml
//! app_name = "shellterm"
//! version = "1.4.0"          # shown in the prompt; "latest" when unset
//! user = "alice"             # overrides the login name
//! working_directory = "/"
//! banner = "Hello!"          # replaces the default banner text
//!
//! [prompt]
//! background = 61            # 256-colour palette index
//! redraw_delay_ms = 10
//!
//! [input]
//! bracketed_paste = true
//! ```

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine config path")]
    NoHome,

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config: {0}")]
    Write(#[from] io::Error),
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name shown in the prompt and banner
    pub app_name: String,
    /// Version label shown in the prompt
    pub version: Option<String>,
    /// User name override
    pub user: Option<String>,
    /// Initial working directory of the session
    pub working_directory: String,
    /// Banner text override
    pub banner: Option<String>,
    /// Prompt settings
    pub prompt: PromptConfig,
    /// Input settings
    pub input: InputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "shellterm".to_string(),
            version: None,
            user: None,
            working_directory: "/".to_string(),
            banner: None,
            prompt: PromptConfig::default(),
            input: InputConfig::default(),
        }
    }
}

/// Prompt configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub background: u8,
    /// Pause between a command's report and the next prompt
    pub redraw_delay_ms: u64,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            background: 61,
            redraw_delay_ms: 10,
        }
    }
}

impl PromptConfig {
    pub fn redraw_delay(&self) -> Duration {
        Duration::from_millis(self.redraw_delay_ms)
    }
}

/// Input configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub bracketed_paste: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { bracketed_paste: true }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match fs::read_to_string(&path) {
                    Ok(content) => match toml::from_str(&content) {
                        Ok(config) => return config,
                        Err(e) => warn!("Ignoring invalid config {}: {}", path.display(), e),
                    },
                    Err(e) => warn!("Could not read config {}: {}", path.display(), e),
                }
            }
        }
        Self::default()
    }

    /// Save configuration to file, returning where it was written
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoHome)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Get config file path
    fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }
}

/// `~/.shellterm`
pub fn config_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(|home| PathBuf::from(home).join(".shellterm"))
}
