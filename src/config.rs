//! Runtime configuration
//!
//! Loaded once per process: defaults, then an optional TOML file named by
//! `RVFFI_CONFIG`, then individual environment overrides.

use std::fs;
use std::path::Path;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::abi::Abi;
use crate::logging::{parse_level, LogConfig};

static RUNTIME_CONFIG: OnceCell<RuntimeConfig> = OnceCell::new();

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// ABI used when a caller does not name one
    #[serde(default)]
    pub default_abi: Abi,

    /// Initial capacity of the global signature cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default)]
    pub json: bool,

    #[serde(default)]
    pub spans: bool,

    #[serde(default = "default_perf")]
    pub perf: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_abi: Abi::default(),
            cache_capacity: default_cache_capacity(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
            json: false,
            spans: false,
            perf: default_perf(),
        }
    }
}

fn default_cache_capacity() -> usize {
    64
}

fn default_level() -> String {
    "info".to_string()
}

fn default_perf() -> bool {
    cfg!(debug_assertions)
}

impl RuntimeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults or `RVFFI_CONFIG`, then environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("RVFFI_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `RVFFI_*` overrides from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(abi) = lookup("RVFFI_ABI") {
            self.default_abi = abi
                .parse()
                .map_err(|_| ConfigError::Invalid {
                    key: "RVFFI_ABI",
                    value: abi.clone(),
                })?;
        }
        if let Some(level) = lookup("RVFFI_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(path) = lookup("RVFFI_LOG_FILE") {
            self.logging.file = Some(path);
        }
        if lookup("RVFFI_LOG_JSON").is_some() {
            self.logging.json = true;
        }
        if lookup("RVFFI_LOG_SPANS").is_some() {
            self.logging.spans = true;
        }
        if let Some(perf) = lookup("RVFFI_LOG_PERF") {
            self.logging.perf = perf == "1" || perf.eq_ignore_ascii_case("true");
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if parse_level(&self.logging.level).is_none() {
            return Err(ConfigError::Invalid {
                key: "logging.level",
                value: self.logging.level.clone(),
            });
        }
        Ok(())
    }

    /// Logging setup described by this configuration
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: parse_level(&self.logging.level).unwrap_or(tracing::Level::INFO),
            file_output: self.logging.file.is_some(),
            log_path: self.logging.file.clone(),
            json_format: self.logging.json,
            show_spans: self.logging.spans,
            track_performance: self.logging.perf,
        }
    }

    /// Generate default configuration file content
    pub fn generate_default() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Process-wide configuration, loaded on first use
///
/// A broken configuration falls back to defaults with a warning; the C API
/// has no channel to report it.
pub fn runtime_config() -> &'static RuntimeConfig {
    RUNTIME_CONFIG.get_or_init(|| {
        RuntimeConfig::from_env().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring invalid rvffi configuration");
            RuntimeConfig::default()
        })
    })
}
