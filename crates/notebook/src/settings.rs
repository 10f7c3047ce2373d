//! Settings persistence for the notebook host.
//!
//! Settings are stored in a JSON file in the user's config directory:
//! - macOS: ~/Library/Application Support/nteract/settings.json
//! - Linux: ~/.config/nteract/settings.json
//! - Windows: C:\Users\<User>\AppData\Roaming\nteract\settings.json

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use kernel_lifecycle::{CoordinatorConfig, CwdProvider};
use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where the host runs. Decides the working directory of kernels for
/// content that has no path yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum HostEnvironment {
    /// Kernels start in the process working directory
    #[default]
    Desktop,
    /// Kernels start at the root of the served tree
    Server,
}

impl std::fmt::Display for HostEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostEnvironment::Desktop => write!(f, "desktop"),
            HostEnvironment::Server => write!(f, "server"),
        }
    }
}

impl std::str::FromStr for HostEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "desktop" => Ok(HostEnvironment::Desktop),
            "server" => Ok(HostEnvironment::Server),
            other => Err(format!("unknown host environment '{}'", other)),
        }
    }
}

impl HostEnvironment {
    pub fn cwd_provider(self) -> CwdProvider {
        match self {
            HostEnvironment::Desktop => CwdProvider::ProcessDir,
            HostEnvironment::Server => CwdProvider::Root,
        }
    }
}

/// Host settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Settings {
    /// Desktop or server hosting
    pub host: HostEnvironment,

    /// Kernelspec for new notebooks
    pub default_kernel: String,

    /// Seconds a restarted kernel has to come back up
    pub restart_timeout_secs: u64,

    /// Seconds reading a file or directory may take
    pub fetch_timeout_secs: u64,

    /// Seconds a new kernel has to answer its first kernel_info_request
    pub kernel_startup_timeout_secs: u64,

    /// Buffered actions per subscriber
    pub bus_capacity: usize,

    /// Buffered kernel messages per subscriber
    pub channel_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: HostEnvironment::Desktop,
            default_kernel: "python3".to_string(),
            restart_timeout_secs: 60,
            fetch_timeout_secs: 60,
            kernel_startup_timeout_secs: 30,
            bus_capacity: 1024,
            channel_capacity: 1024,
        }
    }
}

impl Settings {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            restart_timeout: Duration::from_secs(self.restart_timeout_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            bus_capacity: self.bus_capacity,
            channel_capacity: self.channel_capacity,
            cwd_provider: self.host.cwd_provider(),
            ..Default::default()
        }
    }

    pub fn kernel_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.kernel_startup_timeout_secs)
    }
}

/// Get the path to the settings file
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nteract")
        .join("settings.json")
}

/// Load settings from disk, returning defaults if the file doesn't exist
pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

/// Load settings from `path`. A missing or unreadable file yields defaults.
pub fn load_settings_from(path: &Path) -> Settings {
    if !path.exists() {
        return Settings::default();
    }
    match std::fs::read_to_string(path).map(|s| serde_json::from_str(&s)) {
        Ok(Ok(settings)) => settings,
        Ok(Err(e)) => {
            warn!("[settings] Ignoring invalid {:?}: {}", path, e);
            Settings::default()
        }
        Err(e) => {
            warn!("[settings] Could not read {:?}: {}", path, e);
            Settings::default()
        }
    }
}

/// Save settings to disk
pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(&settings_path(), settings)
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}

/// JSON schema for the settings file.
pub fn settings_schema() -> schemars::Schema {
    schemars::schema_for!(Settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.host, HostEnvironment::Desktop);
        assert_eq!(settings.default_kernel, "python3");
        assert_eq!(settings.restart_timeout_secs, 60);

        let config = settings.coordinator_config();
        assert_eq!(config.restart_timeout, Duration::from_secs(60));
        assert_eq!(config.fetch_timeout, Duration::from_secs(60));
        assert_eq!(config.cwd_provider, CwdProvider::ProcessDir);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let json = r#"{"host": "server", "restart_timeout_secs": 5}"#;
        let parsed: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.host, HostEnvironment::Server);
        assert_eq!(parsed.restart_timeout_secs, 5);
        assert_eq!(parsed.fetch_timeout_secs, 60);
        assert_eq!(parsed.coordinator_config().cwd_provider, CwdProvider::Root);
    }

    #[test]
    fn test_host_environment_parse() {
        assert_eq!("Server".parse::<HostEnvironment>(), Ok(HostEnvironment::Server));
        assert_eq!(HostEnvironment::Desktop.to_string(), "desktop");
        assert!("cloud".parse::<HostEnvironment>().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            default_kernel: "deno".into(),
            ..Default::default()
        };

        save_settings_to(&path, &settings).unwrap();
        assert_eq!(load_settings_from(&path), settings);
    }

    #[test]
    fn test_invalid_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings_from(&path), Settings::default());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            load_settings_from(&dir.path().join("absent.json")),
            Settings::default()
        );
    }

    #[test]
    fn test_schema_lists_fields() {
        let schema = serde_json::to_value(settings_schema()).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("restart_timeout_secs"));
        assert!(properties.contains_key("host"));
    }

    #[test]
    fn test_settings_path_is_valid() {
        let path = settings_path();
        assert!(path.ends_with("nteract/settings.json"));
    }
}
