use anyhow::Context;
use serde::{Serialize, Deserialize};
use std::path::Path;
use std::str::FromStr;

use crate::logging::LogLevel;

/// Lock service configuration with sensible defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Maximum lock requests in one acquire batch (0 = unlimited)
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Process log filter (trace, debug, info, warn, error, off)
    pub log_level: String,
    /// Keep an in-memory audit trail of lock decisions
    pub enable_audit_log: bool,
    /// Maximum audit events retained
    pub max_audit_events: usize,
    /// Lowest level recorded in the audit trail
    pub audit_min_level: LogLevel,
}

impl Config {
    /// Default configuration for production
    pub fn production() -> Self {
        Config {
            service: ServiceConfig {
                max_batch_size: 0,
            },
            logging: LoggingConfig {
                log_level: "info".to_string(),
                enable_audit_log: true,
                max_audit_events: 10000,
                audit_min_level: LogLevel::Info,
            },
        }
    }

    /// Development configuration
    pub fn development() -> Self {
        let mut config = Self::production();
        config.logging.log_level = "debug".to_string();
        config.logging.audit_min_level = LogLevel::Debug;
        config
    }

    /// Testing configuration
    pub fn testing() -> Self {
        let mut config = Self::development();
        config.logging.max_audit_events = 1000;
        config
    }

    /// Preset by name, `None` for an unknown name
    pub fn named_preset(preset: &str) -> Option<Self> {
        match preset {
            "production" => Some(Config::production()),
            "development" => Some(Config::development()),
            "testing" => Some(Config::testing()),
            _ => None,
        }
    }

    pub fn from_preset(preset: &str) -> Self {
        Config::named_preset(preset).unwrap_or_else(|| {
            log::warn!("Unknown preset '{}', using production", preset);
            Config::production()
        })
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load and validate a JSON config file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config = Self::from_json(&contents)?;
        config
            .validate()
            .map_err(|errors| anyhow::anyhow!("Invalid config {:?}: {}", path, errors.join("; ")))?;
        Ok(config)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        log::LevelFilter::from_str(&self.logging.log_level).unwrap_or(log::LevelFilter::Info)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if log::LevelFilter::from_str(&self.logging.log_level).is_err() {
            errors.push(format!("log_level '{}' is not a valid level", self.logging.log_level));
        }

        if self.logging.enable_audit_log && self.logging.max_audit_events == 0 {
            errors.push("max_audit_events must be > 0 when the audit log is enabled".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::production()
    }
}

/// Configuration builder for fluent API
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::production(),
        }
    }

    pub fn from_preset(preset: &str) -> Self {
        ConfigBuilder {
            config: Config::from_preset(preset),
        }
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.service.max_batch_size = size;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.log_level = level.into();
        self
    }

    pub fn enable_audit_log(mut self, enable: bool) -> Self {
        self.config.logging.enable_audit_log = enable;
        self
    }

    pub fn max_audit_events(mut self, max: usize) -> Self {
        self.config.logging.max_audit_events = max;
        self
    }

    pub fn build(self) -> anyhow::Result<Config> {
        match self.config.validate() {
            Ok(()) => Ok(self.config),
            Err(errors) => Err(anyhow::anyhow!("Configuration validation failed: {}", errors.join("; ")))
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
