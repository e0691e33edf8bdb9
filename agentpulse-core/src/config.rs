use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::alerts::NotifierConfig;
use crate::anomaly::{validate_config, MIN_SAMPLES};
use crate::models::{AnomalyConfig, ModelPricing};

const APP_DIR: &str = "agentpulse";
const ENV_PREFIX: &str = "AGENTPULSE";

/// Upper bound for `engine.liveness_timeout_secs` (30 days).
pub const MAX_LIVENESS_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigLoadError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigLoadError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PulseConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    #[serde(default)]
    pub notifications: NotifierConfig,
    /// Rate overrides merged over the built-in pricing table.
    #[serde(default)]
    pub pricing: Vec<ModelPricing>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_latency_window")]
    pub latency_window: usize,

    #[serde(default = "default_trend_capacity")]
    pub trend_capacity: usize,

    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_secs: u64,

    #[serde(default = "default_activity_capacity")]
    pub activity_capacity: usize,

    #[serde(default = "default_history_limit")]
    pub alert_history_limit: usize,

    #[serde(default = "default_history_limit")]
    pub anomaly_history_limit: usize,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_tick_interval() -> u64 {
    1000
}

fn default_latency_window() -> usize {
    1000
}

fn default_trend_capacity() -> usize {
    60
}

fn default_liveness_timeout() -> u64 {
    300
}

fn default_activity_capacity() -> usize {
    100
}

fn default_history_limit() -> usize {
    200
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            latency_window: default_latency_window(),
            trend_capacity: default_trend_capacity(),
            liveness_timeout_secs: default_liveness_timeout(),
            activity_capacity: default_activity_capacity(),
            alert_history_limit: default_history_limit(),
            anomaly_history_limit: default_history_limit(),
        }
    }
}

impl PulseConfig {
    /// Loads `.env` files, then the standard config file locations, then `AGENTPULSE_*`
    /// environment variables.
    pub fn load() -> Result<Self, ConfigLoadError> {
        load_dotenv_files();
        Self::load_from_paths(get_config_paths())
    }

    /// Later paths take precedence over earlier ones. Missing files are skipped. Nested keys
    /// are read from the environment with a double underscore, e.g.
    /// `AGENTPULSE_ENGINE__TICK_INTERVAL_MS`.
    pub fn load_from_paths(paths: Vec<PathBuf>) -> Result<Self, ConfigLoadError> {
        let mut builder = ConfigBuilder::builder();

        for path in paths {
            if path.exists() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut pulse_config: PulseConfig = builder.build()?.try_deserialize()?;

        if let Ok(level) = std::env::var("AGENTPULSE_LOG_LEVEL") {
            pulse_config.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            pulse_config.logging.level = level;
        }

        if let Ok(interval) = std::env::var("AGENTPULSE_TICK_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                pulse_config.engine.tick_interval_ms = ms;
            }
        }

        pulse_config.validate()?;

        Ok(pulse_config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let engine = &self.engine;
        let positive = [
            ("engine.tick_interval_ms", engine.tick_interval_ms as usize),
            ("engine.latency_window", engine.latency_window),
            ("engine.trend_capacity", engine.trend_capacity),
            ("engine.liveness_timeout_secs", engine.liveness_timeout_secs as usize),
            ("engine.activity_capacity", engine.activity_capacity),
            ("engine.alert_history_limit", engine.alert_history_limit),
            ("engine.anomaly_history_limit", engine.anomaly_history_limit),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigLoadError::invalid(key, "Must be greater than 0"));
            }
        }

        if engine.liveness_timeout_secs > MAX_LIVENESS_TIMEOUT_SECS {
            return Err(ConfigLoadError::invalid(
                "engine.liveness_timeout_secs",
                format!("Must be at most {} seconds", MAX_LIVENESS_TIMEOUT_SECS),
            ));
        }

        if self.anomaly.window_size < MIN_SAMPLES {
            return Err(ConfigLoadError::invalid(
                "anomaly.window_size",
                format!("Must be at least {}", MIN_SAMPLES),
            ));
        }
        validate_config(&self.anomaly)
            .map_err(|e| ConfigLoadError::invalid("anomaly", e.to_string()))?;

        if self.notifications.timeout_secs == 0 {
            return Err(ConfigLoadError::invalid(
                "notifications.timeout_secs",
                "Must be greater than 0",
            ));
        }
        if self.notifications.pagerduty_url.trim().is_empty() {
            return Err(ConfigLoadError::MissingRequired(
                "notifications.pagerduty_url".to_string(),
            ));
        }

        for pricing in &self.pricing {
            let rates = [pricing.input_price_per_1k, pricing.output_price_per_1k];
            if pricing.model.trim().is_empty() || rates.iter().any(|r| !r.is_finite() || *r < 0.0) {
                return Err(ConfigLoadError::invalid(
                    "pricing",
                    format!("Invalid rates for model '{}'", pricing.model),
                ));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !valid_levels.contains(&level_lower.as_str()) && !level_lower.contains('=') {
            return Err(ConfigLoadError::invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {:?}",
                    self.logging.level, valid_levels
                ),
            ));
        }

        Ok(())
    }

    pub fn log_level(&self) -> &str {
        &self.logging.level
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.engine.tick_interval_ms)
    }
}

fn get_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(config_dir) = get_config_dir() {
        paths.push(config_dir.join("config.toml"));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("agentpulse.toml"));
        paths.push(cwd.join("config").join("local.toml"));
    }

    paths
}

fn load_dotenv_files() {
    for path in get_dotenv_paths() {
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }
}

fn get_dotenv_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".env"));
        paths.push(cwd.join(".env.local"));
    }

    if let Some(config_dir) = get_config_dir() {
        paths.push(config_dir.join(".env"));
    }

    paths
}

pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR))
}
