//! Configuration resolution for permgate.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config_dir>/permgate/settings.json`)
//! 3. Explicit config file (e.g. `--config` on the command line)
//! 4. Environment variables
//! 5. CLI arguments (applied by the caller, highest priority)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete permgate configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub arbiter: ArbiterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Arbitration engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Seconds an originator stays suppressed after a group resolution.
    pub cooldown_secs: u64,
    /// Seconds a pending group negotiation may hold deferred requests.
    pub grace_period_secs: u64,
    /// Upper bound on the host "is focused" query (milliseconds).
    pub focus_query_timeout_ms: u64,
    /// Capacity of the UI event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 5 * 60,
            grace_period_secs: 20,
            focus_query_timeout_ms: 1_500,
            event_capacity: 256,
        }
    }
}

impl ArbiterConfig {
    /// Convert to the duration-typed settings consumed by the engine.
    pub fn settings(&self) -> ArbiterSettings {
        ArbiterSettings {
            cooldown: Duration::from_secs(self.cooldown_secs),
            grace_period: Duration::from_secs(self.grace_period_secs),
            focus_query_timeout: Duration::from_millis(self.focus_query_timeout_ms),
            event_capacity: self.event_capacity.max(1),
        }
    }
}

/// Duration-typed engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterSettings {
    pub cooldown: Duration,
    pub grace_period: Duration,
    pub focus_query_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        ArbiterConfig::default().settings()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// A missing global file is skipped; a missing explicit file is an error.
/// Files are merged key by key, so a later file only overrides the settings
/// it actually names.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut layers = Vec::new();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            layers.push(global_path);
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }
        layers.push(path.to_path_buf());
    }

    let mut config = layer_files(&layers)?;
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("permgate").join("settings.json"))
}

/// Merge `paths` in order over the built-in defaults.
fn layer_files(paths: &[PathBuf]) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;
    for path in paths {
        merge_values(&mut merged, load_config_value(path)?);
    }
    Ok(serde_json::from_value(merged)?)
}

/// Read one settings file, checking it against the config schema.
fn load_config_value(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    if !value.is_object() {
        return Err(Error::Config(format!(
            "Config file {} must contain a JSON object",
            path.display()
        )));
    }
    serde_json::from_value::<Config>(value.clone()).map_err(|e| {
        Error::Config(format!("Invalid config file {}: {}", path.display(), e))
    })?;
    Ok(value)
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_values(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(config: &mut Config) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(n) = lookup("PERMGATE_COOLDOWN_SECS").and_then(|v| v.parse().ok()) {
        config.arbiter.cooldown_secs = n;
    }
    if let Some(n) = lookup("PERMGATE_GRACE_PERIOD_SECS").and_then(|v| v.parse().ok()) {
        config.arbiter.grace_period_secs = n;
    }
    if let Some(n) = lookup("PERMGATE_FOCUS_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.arbiter.focus_query_timeout_ms = n;
    }
    if let Some(val) = lookup("PERMGATE_LOG_LEVEL") {
        config.logging.level = val;
    }
}
