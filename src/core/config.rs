//! Engine configuration.
//!
//! `EngineConfig` is the single typed configuration object the orchestrator
//! and registry clients are built from. It replaces the original Python
//! implementation's module-level globals (`GITHUB_TOKEN`, `DOCKERHUB_*`,
//! `ENABLED_ANALYZERS`, computed at import time in `config.py`) with an
//! explicit, testable value: defaults, then an optional YAML file, then
//! environment variable overrides.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{EngineError, Result};

/// Per-analyzer enable/disable toggles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalyzerToggles {
    /// Enable the infrastructure-template analyzer.
    pub infra: bool,
    /// Enable the container analyzer.
    pub container: bool,
    /// Enable the dependency analyzer.
    pub dependency: bool,
}

impl Default for AnalyzerToggles {
    fn default() -> Self {
        Self {
            infra: true,
            container: true,
            dependency: true,
        }
    }
}

/// Code forge access configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ForgeConfig {
    /// Optional bearer token. Anonymous access is used if absent.
    pub token: Option<String>,
    /// Base URL of the code forge's REST API.
    pub base_url: String,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: "https://api.github.com".to_string(),
        }
    }
}

/// Default container registry credentials (used for the token-exchange
/// flow against the default registry).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContainerRegistryConfig {
    /// Registry username.
    pub username: Option<String>,
    /// Registry password or access token.
    pub password: Option<String>,
}

/// Logging verbosity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to a [`tracing::Level`].
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Which analyzers are active.
    pub analyzers: AnalyzerToggles,
    /// Code forge access.
    pub forge: ForgeConfig,
    /// Default container registry credentials.
    pub container_registry: ContainerRegistryConfig,
    /// Logging verbosity.
    pub log_level: LogLevel,
}

impl EngineConfig {
    /// Load configuration layered as defaults → optional YAML file →
    /// environment variable overrides.
    pub fn load(yaml_path: Option<&Path>) -> Result<Self> {
        let mut config = match yaml_path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EngineError::config(format!("could not read {}: {e}", path.display())))?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Write this configuration to a YAML file.
    pub fn to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Apply `ARM_*` environment variable overrides on top of whatever was
    /// loaded from defaults/file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = env::var("ARM_FORGE_TOKEN") {
            if !token.is_empty() {
                self.forge.token = Some(token);
            }
        }
        if let Ok(username) = env::var("ARM_DOCKERHUB_USERNAME") {
            if !username.is_empty() {
                self.container_registry.username = Some(username);
            }
        }
        if let Ok(password) = env::var("ARM_DOCKERHUB_PASSWORD") {
            if !password.is_empty() {
                self.container_registry.password = Some(password);
            }
        }
        if let Ok(level) = env::var("ARM_LOG_LEVEL") {
            self.log_level = match level.to_lowercase().as_str() {
                "trace" => LogLevel::Trace,
                "debug" => LogLevel::Debug,
                "warn" => LogLevel::Warn,
                "error" => LogLevel::Error,
                _ => LogLevel::Info,
            };
        }
        apply_bool_env("ARM_ENABLE_INFRA_ANALYZER", &mut self.analyzers.infra);
        apply_bool_env(
            "ARM_ENABLE_CONTAINER_ANALYZER",
            &mut self.analyzers.container,
        );
        apply_bool_env(
            "ARM_ENABLE_DEPENDENCY_ANALYZER",
            &mut self.analyzers.dependency,
        );

        if self.forge.token.is_none() {
            tracing::warn!("ARM_FORGE_TOKEN not set; forge API rate limits may be lower");
        }
        if self.container_registry.username.is_none()
            || self.container_registry.password.is_none()
        {
            tracing::warn!(
                "container registry credentials not set; manifest inspection may be rate-limited"
            );
        }
    }
}

fn apply_bool_env(name: &str, target: &mut bool) {
    if let Ok(value) = env::var(name) {
        *target = value.eq_ignore_ascii_case("true");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_enables_all_analyzers() {
        let config = EngineConfig::default();
        assert!(config.analyzers.infra);
        assert!(config.analyzers.container);
        assert!(config.analyzers.dependency);
        assert_eq!(config.forge.base_url, "https://api.github.com");
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let mut config = EngineConfig::default();
        config.analyzers.container = false;
        config.to_yaml_file(&path).unwrap();

        let loaded = EngineConfig::from_yaml_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_malformed_yaml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "analyzers: [this, is, not, a, map]").unwrap();

        let result = EngineConfig::from_yaml_file(&path);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_override_toggles_analyzer() {
        std::env::set_var("ARM_ENABLE_CONTAINER_ANALYZER", "false");
        let mut config = EngineConfig::default();
        config.apply_env_overrides();
        assert!(!config.analyzers.container);
        std::env::remove_var("ARM_ENABLE_CONTAINER_ANALYZER");
    }
}
