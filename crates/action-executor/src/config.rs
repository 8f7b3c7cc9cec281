//! Executor Configuration
//!
//! Loaded from a mounted YAML file. Every field has a default so an absent or partial
//! file still yields a usable configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Where the agent's configuration is mounted
pub const DEFAULT_CONFIG_PATH: &str = "/config/config.yaml";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`]
pub const CONFIG_PATH_ENV: &str = "EXECUTOR_CONFIG_PATH";

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How to pick an owning controller when several selectors match a pod
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OwnerResolution {
    /// Sort matching controllers by name and take the first
    #[default]
    FirstByName,
    /// Fail resolution when more than one controller matches
    RejectAmbiguous,
}

/// Main executor configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorConfig {
    /// How long a scale-out waits for its new pod
    #[serde(default = "default_rendezvous_timeout_seconds")]
    pub rendezvous_timeout_seconds: u64,

    /// Replicas added by a provision action and removed by an unbind action
    #[serde(default = "default_scale_delta")]
    pub scale_delta: i32,

    /// Tie-break policy for owner resolution
    #[serde(default)]
    pub owner_resolution: OwnerResolution,

    /// Namespace watched for new pods (all namespaces when unset)
    #[serde(default)]
    pub watch_namespace: Option<String>,

    /// Address the agent HTTP server binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_rendezvous_timeout_seconds() -> u64 {
    300 // 5 minutes
}

fn default_scale_delta() -> i32 {
    1
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            rendezvous_timeout_seconds: default_rendezvous_timeout_seconds(),
            scale_delta: default_scale_delta(),
            owner_resolution: OwnerResolution::default(),
            watch_namespace: None,
            listen_addr: default_listen_addr(),
        }
    }
}

impl ExecutorConfig {
    /// File to load: `override_path` when it exists, [`DEFAULT_CONFIG_PATH`] otherwise
    #[must_use]
    pub fn resolve_path(override_path: Option<&str>) -> &str {
        match override_path {
            Some(path) if Path::new(path).exists() => path,
            Some(path) => {
                warn!(
                    "{} points at missing file {}, ignoring it and using {}",
                    CONFIG_PATH_ENV, path, DEFAULT_CONFIG_PATH
                );
                DEFAULT_CONFIG_PATH
            }
            None => DEFAULT_CONFIG_PATH,
        }
    }

    /// Load the agent configuration, falling back to defaults when no file can be read
    #[must_use]
    pub fn load(override_path: Option<&str>) -> Self {
        let config_path = Self::resolve_path(override_path);

        match Self::from_mounted_file(config_path) {
            Ok(cfg) => {
                info!("Loaded executor configuration from {}", config_path);
                cfg
            }
            Err(err) => {
                warn!(
                    "Failed to load configuration from {}: {}. Using defaults.",
                    config_path, err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from a mounted file
    pub fn from_mounted_file(config_path: &str) -> Result<Self, ConfigError> {
        let config_str =
            std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
                path: config_path.to_string(),
                source,
            })?;

        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scale_delta < 1 {
            return Err(ConfigError::Invalid(format!(
                "scaleDelta must be at least 1, got {}",
                self.scale_delta
            )));
        }
        if self.rendezvous_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "rendezvousTimeoutSeconds must be greater than zero".to_string(),
            ));
        }
        if self.listen_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("listenAddr must not be empty".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn rendezvous_timeout(&self) -> Duration {
        Duration::from_secs(self.rendezvous_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml = r#"
rendezvousTimeoutSeconds: 120
scaleDelta: 2
ownerResolution: reject-ambiguous
watchNamespace: "shop"
listenAddr: "127.0.0.1:9090"
"#;

        let config = ExecutorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rendezvous_timeout(), Duration::from_secs(120));
        assert_eq!(config.scale_delta, 2);
        assert_eq!(config.owner_resolution, OwnerResolution::RejectAmbiguous);
        assert_eq!(config.watch_namespace.as_deref(), Some("shop"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config() {
        let config = ExecutorConfig::default();
        assert_eq!(config.rendezvous_timeout(), Duration::from_secs(300));
        assert_eq!(config.scale_delta, 1);
        assert_eq!(config.owner_resolution, OwnerResolution::FirstByName);
        assert!(config.watch_namespace.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config = ExecutorConfig::from_yaml("scaleDelta: 3\n").unwrap();
        assert_eq!(config.scale_delta, 3);
        assert_eq!(config.rendezvous_timeout_seconds, 300);
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn validate_rejects_non_positive_delta_and_zero_timeout() {
        let mut config = ExecutorConfig {
            scale_delta: 0,
            ..ExecutorConfig::default()
        };
        assert!(config.validate().is_err());

        config.scale_delta = 1;
        config.rendezvous_timeout_seconds = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ExecutorConfig::from_mounted_file("/nonexistent/executor.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/executor.yaml"));
    }

    #[test]
    fn missing_override_falls_back_to_mounted_path() {
        assert_eq!(
            ExecutorConfig::resolve_path(Some("/nonexistent/override.yaml")),
            DEFAULT_CONFIG_PATH
        );
        assert_eq!(ExecutorConfig::resolve_path(None), DEFAULT_CONFIG_PATH);
    }

    #[test]
    fn existing_override_is_loaded() {
        let path = std::env::temp_dir().join(format!("executor-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "scaleDelta: 4\n").unwrap();
        let path = path.to_string_lossy().into_owned();

        assert_eq!(ExecutorConfig::resolve_path(Some(&path)), path);
        assert_eq!(ExecutorConfig::load(Some(&path)).scale_delta, 4);

        std::fs::remove_file(&path).unwrap();
    }
}
