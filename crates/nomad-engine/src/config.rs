//! Session settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NomadError, Result};

/// Per-device session settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Timeout for every control and bulk call, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Pause before each control request, in microseconds
    #[serde(default = "default_command_delay_us")]
    pub command_delay_us: u64,
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_command_delay_us() -> u64 {
    400
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            command_delay_us: default_command_delay_us(),
        }
    }
}

impl SessionConfig {
    /// Get the XDG config directory for nomad
    /// Uses $XDG_CONFIG_HOME/nomad, falls back to ~/.config/nomad
    pub fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("nomad"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("nomad"))
    }

    /// Default settings file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("session.json"))
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|path| Self::load_from(&path).ok())
            .unwrap_or_default()
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| NomadError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| NomadError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Save settings to a specific file, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                NomadError::Config(format!("failed to create settings directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| NomadError::Config(format!("failed to serialize settings: {}", e)))?;

        std::fs::write(path, json)
            .map_err(|e| NomadError::Config(format!("failed to write settings: {}", e)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_micros(self.command_delay_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nomad-config-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(2000));
        assert_eq!(config.command_delay(), Duration::from_micros(400));
    }

    #[test]
    fn test_save_and_load() {
        let dir = scratch_dir("roundtrip");
        let path = dir.join("nested").join("session.json");
        let config = SessionConfig {
            timeout_ms: 5000,
            command_delay_us: 0,
        };

        config.save_to(&path).unwrap();
        assert_eq!(SessionConfig::load_from(&path).unwrap(), config);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"timeout_ms": 100}"#).unwrap();
        assert_eq!(config.timeout_ms, 100);
        assert_eq!(config.command_delay_us, 400);
    }

    #[test]
    fn test_load_errors_are_config_errors() {
        let dir = scratch_dir("bad");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            SessionConfig::load_from(&path),
            Err(NomadError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::load_from(&dir.join("missing.json")),
            Err(NomadError::Config(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
