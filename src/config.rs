//! Configuration management for CellScope
//!
//! TOML-based configuration with defaults and validation.
//! Location: ~/.cellscope/config.toml

use crate::errors::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration for CellScope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub paths: PathsConfig,
    /// Enables the source-tree search location
    pub dev_mode: bool,
}

/// Inference server connection and supervision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Interpreter used to run the server script
    pub python: String,
    /// Server script; relative paths resolve against the runtime directory
    pub script: String,
    /// Spawn the server when the probe fails
    pub auto_start: bool,
    pub probe_timeout_ms: u64,
    pub startup_timeout_secs: u64,
    pub load_timeout_secs: u64,
    pub analyze_timeout_secs: u64,
    pub environment_timeout_secs: u64,
}

/// Model selection remembered between runs
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ModelConfig {
    pub remembered_path: Option<String>,
}

/// File system locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Application root; defaults to the executable's directory
    pub app_root: Option<String>,
    /// Platform resources directory; defaults to `<exe dir>/resources`
    pub resources_dir: Option<String>,
    /// Writable directory holding the installed server script
    pub runtime_dir: String,
    /// Source tree searched in dev mode; defaults to the crate directory
    pub dev_root: Option<String>,
    /// Bundled server script copied to `server.script` on first run
    pub bundled_script: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            model: ModelConfig::default(),
            paths: PathsConfig::default(),
            dev_mode: cfg!(debug_assertions),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            python: default_python().to_string(),
            script: "model_server.py".to_string(),
            auto_start: true,
            probe_timeout_ms: 2000,
            startup_timeout_secs: 20,
            load_timeout_secs: 30,
            analyze_timeout_secs: 15,
            environment_timeout_secs: 5,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            app_root: None,
            resources_dir: None,
            runtime_dir: "~/.cellscope/runtime".to_string(),
            dev_root: None,
            bundled_script: None,
        }
    }
}

fn default_python() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

impl ServerConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn analyze_timeout(&self) -> Duration {
        Duration::from_secs(self.analyze_timeout_secs)
    }

    pub fn environment_timeout(&self) -> Duration {
        Duration::from_secs(self.environment_timeout_secs)
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| BridgeError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// Standard config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".cellscope").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(BridgeError::Config("server.host must not be empty".to_string()));
        }

        if self.server.port == 0 {
            return Err(BridgeError::Config("server.port must be greater than 0".to_string()));
        }

        if self.server.probe_timeout_ms == 0 {
            return Err(BridgeError::Config(
                "server.probe_timeout_ms must be greater than 0".to_string(),
            ));
        }

        for (name, secs) in [
            ("startup_timeout_secs", self.server.startup_timeout_secs),
            ("load_timeout_secs", self.server.load_timeout_secs),
            ("analyze_timeout_secs", self.server.analyze_timeout_secs),
            ("environment_timeout_secs", self.server.environment_timeout_secs),
        ] {
            if secs == 0 {
                return Err(BridgeError::Config(format!("server.{} must be greater than 0", name)));
            }
        }

        if self.server.python.trim().is_empty() {
            return Err(BridgeError::Config("server.python must not be empty".to_string()));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BridgeError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| BridgeError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Inference server base URL
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server.host, self.server.port)
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Writable runtime directory
    pub fn runtime_dir(&self) -> PathBuf {
        Self::expand_path(&self.paths.runtime_dir)
    }

    /// Resolved server script path
    pub fn script_path(&self) -> PathBuf {
        let script = Self::expand_path(&self.server.script);
        if script.is_absolute() {
            script
        } else {
            self.runtime_dir().join(script)
        }
    }

    /// Remembered model path, if any
    pub fn remembered_model(&self) -> Option<PathBuf> {
        self.model
            .remembered_path
            .as_deref()
            .map(Self::expand_path)
    }

    /// Remember a user-chosen model path
    pub fn remember_model(&mut self, path: &Path) {
        self.model.remembered_path = Some(path.display().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert!(config.server.auto_start);
        assert!(config.model.remembered_path.is_none());
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.server.analyze_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_url() {
        assert_eq!(Config::default().server_url(), "http://127.0.0.1:5000");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[server]\nport = 5055\n").unwrap();
        assert_eq!(config.server.port, 5055);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.load_timeout_secs, 30);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.remember_model(Path::new("/data/models/model.h5"));
        config.save(&path).unwrap();

        let loaded = Config::load(Some(path)).unwrap();
        assert_eq!(loaded.remembered_model(), Some(PathBuf::from("/data/models/model.h5")));
    }

    #[test]
    fn test_script_path_relative_to_runtime_dir() {
        let mut config = Config::default();
        config.paths.runtime_dir = "/var/lib/cellscope".to_string();
        assert_eq!(config.script_path(), PathBuf::from("/var/lib/cellscope/model_server.py"));

        config.server.script = "/opt/server.py".to_string();
        assert_eq!(config.script_path(), PathBuf::from("/opt/server.py"));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = Config::expand_path("~/.cellscope");
        assert!(!expanded.to_string_lossy().contains('~'));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = "/absolute/path";
        assert_eq!(Config::expand_path(path).to_string_lossy(), path);
    }
}
