//! Configuration loading and management

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::ducking::DEFAULT_KEY_PREFIX;

const DEFAULT_PREFERENCES_DOMAIN: &str = "com.ultrawhisper.volume-duck";

/// Where the pre-duck snapshot is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// JSON file in the data directory
    File,
    /// macOS user defaults
    Preferences,
}

impl StoreBackend {
    fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::Preferences
        } else {
            Self::File
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "preferences" | "defaults" => Ok(Self::Preferences),
            other => bail!("unknown store backend: {other}"),
        }
    }
}

/// Which audio binding drives the output device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareBackend {
    CoreAudio,
    /// In-memory device, for development on machines without CoreAudio
    Simulated,
}

impl HardwareBackend {
    fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::CoreAudio
        } else {
            Self::Simulated
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "coreaudio" => Ok(Self::CoreAudio),
            "simulated" => Ok(Self::Simulated),
            other => bail!("unknown hardware backend: {other}"),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// JSON file used by the file store
    pub state_file: PathBuf,

    pub store: StoreBackend,

    pub hardware: HardwareBackend,

    /// Prefix of the four snapshot keys
    pub key_prefix: String,

    /// Application domain used by the preferences store
    pub preferences_domain: String,

    /// Run the crash-recovery sweep at startup
    pub restore_on_launch: bool,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = match lookup("VOLUME_DUCK_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = lookup("HOME").context("HOME is not set")?;
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("volume-duck")
            }
        };

        let socket_path = data_dir.join("daemon.sock");
        let state_file = data_dir.join("saved-volume.json");

        let store = match lookup("VOLUME_DUCK_STORE") {
            Some(value) => StoreBackend::parse(&value)?,
            None => StoreBackend::platform_default(),
        };

        let hardware = match lookup("VOLUME_DUCK_HARDWARE") {
            Some(value) => HardwareBackend::parse(&value)?,
            None => HardwareBackend::platform_default(),
        };

        let key_prefix = lookup("VOLUME_DUCK_KEY_PREFIX")
            .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());

        let preferences_domain = lookup("VOLUME_DUCK_DEFAULTS_DOMAIN")
            .unwrap_or_else(|| DEFAULT_PREFERENCES_DOMAIN.to_string());

        let restore_on_launch = lookup("VOLUME_DUCK_RESTORE_ON_LAUNCH")
            .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        Ok(Self {
            socket_path,
            data_dir,
            state_file,
            store,
            hardware,
            key_prefix,
            preferences_domain,
            restore_on_launch,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load_with(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.socket_path.to_string_lossy().contains("volume-duck"));
    }

    #[test]
    fn test_defaults_from_home() {
        let config = load_with(&[("HOME", "/Users/test")]).unwrap();
        assert_eq!(
            config.socket_path,
            PathBuf::from("/Users/test/.local/share/volume-duck/daemon.sock")
        );
        assert_eq!(config.key_prefix, "com.ultrawhisper.savedVolume");
        assert_eq!(config.preferences_domain, "com.ultrawhisper.volume-duck");
        assert!(config.restore_on_launch);
        assert_eq!(config.store, StoreBackend::platform_default());
    }

    #[test]
    fn test_environment_overrides() {
        let config = load_with(&[
            ("VOLUME_DUCK_DATA_DIR", "/tmp/duck"),
            ("VOLUME_DUCK_STORE", "file"),
            ("VOLUME_DUCK_HARDWARE", "simulated"),
            ("VOLUME_DUCK_KEY_PREFIX", "test.saved"),
            ("VOLUME_DUCK_RESTORE_ON_LAUNCH", "false"),
        ])
        .unwrap();

        assert_eq!(config.state_file, PathBuf::from("/tmp/duck/saved-volume.json"));
        assert_eq!(config.store, StoreBackend::File);
        assert_eq!(config.hardware, HardwareBackend::Simulated);
        assert_eq!(config.key_prefix, "test.saved");
        assert!(!config.restore_on_launch);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(load_with(&[("HOME", "/h"), ("VOLUME_DUCK_STORE", "redis")]).is_err());
        assert!(load_with(&[]).is_err());
    }
}
