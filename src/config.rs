//! Configuration loading for LiveDesk.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Get the LiveDesk home directory (~/.livedesk).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".livedesk"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings.
///
/// An explicit path must exist. Without one, ~/.livedesk/settings.json is read
/// when present and defaults are used otherwise.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let settings = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Settings file not found at {}",
                    path.display()
                )));
            }
            read_settings(path)?
        }
        None => {
            let path = get_settings_path()?;
            if path.exists() {
                read_settings(&path)?
            } else {
                tracing::debug!("No settings at {}, using defaults", path.display());
                Settings::default()
            }
        }
    };

    validate_settings(&settings)?;
    Ok(settings)
}

fn read_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.server.port == 0 {
        return Err(Error::Config("server.port must be non-zero".to_string()));
    }
    if settings.agent.default_id.trim().is_empty() {
        return Err(Error::Config(
            "agent.default_id must not be empty".to_string(),
        ));
    }
    if settings.relay.shutdown_timeout_ms == 0 {
        return Err(Error::Config(
            "relay.shutdown_timeout_ms must be greater than zero".to_string(),
        ));
    }
    if settings.relay.inbound_buffer == 0 {
        return Err(Error::Config(
            "relay.inbound_buffer must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// HTTP/WebSocket listener configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Server {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Agent defaults.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Agent {
    /// Identifier used when an agent connects without one.
    #[serde(default = "default_agent_id")]
    pub default_id: String,
}

fn default_agent_id() -> String {
    "agent-1".to_string()
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            default_id: default_agent_id(),
        }
    }
}

/// Relay engine tuning.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Relay {
    /// Upper bound on waiting for a cancelled relay task during teardown.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Frames buffered per WebSocket before the reader applies backpressure.
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,
}

fn default_shutdown_timeout_ms() -> u64 {
    2000
}

fn default_inbound_buffer() -> usize {
    64
}

impl Default for Relay {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            inbound_buffer: default_inbound_buffer(),
        }
    }
}

impl Relay {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// LiveDesk settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: Server,

    #[serde(default)]
    pub agent: Agent,

    #[serde(default)]
    pub relay: Relay,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.agent.default_id, "agent-1");
        assert_eq!(settings.relay.shutdown_timeout(), Duration::from_secs(2));
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"server": {{"port": 9100}}, "agent": {{"default_id": "desk"}}}}"#).unwrap();

        let settings = load_settings(Some(file.path())).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.agent.default_id, "desk");
        assert_eq!(settings.relay.inbound_buffer, 64);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"relay": {{"shutdown_timeout_ms": 0}}}}"#).unwrap();
        assert!(matches!(
            load_settings(Some(file.path())),
            Err(Error::Config(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"agent": {{"default_id": "  "}}}}"#).unwrap();
        assert!(matches!(
            load_settings(Some(file.path())),
            Err(Error::Config(_))
        ));
    }
}
