//! ComaConfig - TOML から読み込む実行時設定
//!
//! 全セクション・全フィールドにデフォルトがあるため、空ファイルでも有効。
//!
//! ```toml
//! [pubsub]
//! default_capacity = 16
//!
//! [routine]
//! timeout_ms = 2000
//!
//! [application]
//! key_length = 36
//!
//! [log]
//! filter = "coma=debug"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComaConfig {
    pub pubsub: PubsubConfig,
    pub routine: RoutineConfig,
    pub application: ApplicationConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PubsubConfig {
    /// Capacity of a topic queue created on first use.
    pub default_capacity: usize,
}

impl Default for PubsubConfig {
    fn default() -> Self {
        Self {
            default_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutineConfig {
    /// Deadline for service-level routines. Unset means wait indefinitely.
    pub timeout_ms: Option<u64>,
}

impl RoutineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApplicationConfig {
    pub key_length: usize,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self { key_length: 36 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "coma=info".to_string(),
        }
    }
}

impl ComaConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pubsub.default_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pubsub.default_capacity must be at least 1".to_string(),
            ));
        }
        if self.application.key_length == 0 {
            return Err(ConfigError::Invalid(
                "application.key_length must be at least 1".to_string(),
            ));
        }
        if self.routine.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "routine.timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}
