#![deny(unsafe_code)]

//! Configuration loading and validation for ctxmesh.
//!
//! Loads TOML configuration files and validates them against expected schemas.
//! Provides the [`AppConfig`] type as the central configuration structure:
//! logging, the storage collaborator, the discoverer's seed data (translation
//! table and available objects) and the static widgets and aggregator used by
//! the `ctxmesh simulate` command.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// The parameter value that marks a parameter as supplied by the caller.
pub const PV_INPUT: &str = "PV_INPUT";

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Persistence backend used by aggregators.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Discoverer seed configuration.
    #[serde(default)]
    pub discoverer: DiscovererConfig,

    /// Declared equivalences between context-information kinds.
    #[serde(default)]
    pub translations: Vec<TranslationConfig>,

    /// Static widgets registered by the simulation command.
    #[serde(default)]
    pub widgets: Vec<WidgetConfig>,

    /// The aggregator constructed by the simulation command.
    #[serde(default)]
    pub aggregator: AggregatorConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage collaborator configuration.
///
/// ## TOML Example
///
/// ```toml
/// [storage]
/// backend = "file"
/// directory = "/var/lib/ctxmesh"
/// flush_count = 20
/// flush_interval_ms = 2000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend: "memory", "file", or "none".
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Directory holding one file per table (when backend = "file").
    #[serde(default = "default_storage_directory")]
    pub directory: String,

    /// Flush the write buffer once it holds this many rows.
    #[serde(default = "default_flush_count")]
    pub flush_count: usize,

    /// Flush the write buffer once this many milliseconds passed since the last flush.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            directory: default_storage_directory(),
            flush_count: default_flush_count(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_storage_directory() -> String {
    "data/ctxmesh".to_string()
}

fn default_flush_count() -> usize {
    10
}

fn default_flush_interval_ms() -> u64 {
    5000
}

/// Discoverer seed configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DiscovererConfig {
    /// Names of objects the host provides. Catalog classes listing a
    /// required object missing from this set are never instantiated.
    #[serde(default)]
    pub available_objects: Vec<String>,
}

/// A context-information kind as expressed in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterConfig>,
}

/// A single kind parameter. The value `"PV_INPUT"` marks a caller-supplied parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterConfig {
    pub key: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub value: serde_json::Value,
}

impl ParameterConfig {
    /// Whether this parameter carries the input sentinel.
    pub fn is_input(&self) -> bool {
        self.value.as_str() == Some(PV_INPUT)
    }
}

/// A bidirectional equivalence between two kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    pub from: KindConfig,
    pub to: KindConfig,
}

/// A static widget: publishes fixed values on every acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetConfig {
    pub name: String,

    /// Periodic acquisition interval in milliseconds (omit for on-demand only).
    #[serde(default)]
    pub update_interval_ms: Option<u64>,

    pub outputs: Vec<ValuedKindConfig>,

    /// Outputs that never change after construction.
    #[serde(default)]
    pub constants: Vec<ValuedKindConfig>,
}

/// A kind together with the value a static widget publishes for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuedKindConfig {
    #[serde(flatten)]
    pub kind: KindConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// The aggregator built by the simulation command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_aggregator_name")]
    pub name: String,

    /// Context information the aggregator should end up providing.
    #[serde(default)]
    pub desired: Vec<KindConfig>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            name: default_aggregator_name(),
            desired: Vec::new(),
        }
    }
}

fn default_aggregator_name() -> String {
    "Aggregator".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_backends = ["memory", "file", "none"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(ConfigError::Validation(format!(
                "storage.backend must be one of {:?}, got {:?}",
                valid_backends, self.storage.backend
            )));
        }
        if self.storage.flush_count == 0 {
            return Err(ConfigError::Validation(
                "storage.flush_count must be at least 1".to_string(),
            ));
        }
        if self.storage.backend == "file" && self.storage.directory.is_empty() {
            return Err(ConfigError::Validation(
                "storage.directory must not be empty when backend is \"file\"".to_string(),
            ));
        }

        for (i, translation) in self.translations.iter().enumerate() {
            validate_kind(&translation.from, &format!("translations[{i}].from"))?;
            validate_kind(&translation.to, &format!("translations[{i}].to"))?;
            if translation.from == translation.to {
                return Err(ConfigError::Validation(format!(
                    "translations[{i}] maps {:?} onto itself",
                    translation.from.name
                )));
            }
        }

        let mut seen = HashSet::new();
        for (i, widget) in self.widgets.iter().enumerate() {
            if widget.name.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "widgets[{i}].name must not be empty"
                )));
            }
            if !seen.insert(widget.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "widgets[{i}].name {:?} is declared twice",
                    widget.name
                )));
            }
            if widget.outputs.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "widgets[{i}] must declare at least one output"
                )));
            }
            if widget.update_interval_ms == Some(0) {
                return Err(ConfigError::Validation(format!(
                    "widgets[{i}].update_interval_ms must be non-zero"
                )));
            }
            for (j, output) in widget.outputs.iter().enumerate() {
                validate_kind(&output.kind, &format!("widgets[{i}].outputs[{j}]"))?;
            }
            for (j, constant) in widget.constants.iter().enumerate() {
                validate_kind(&constant.kind, &format!("widgets[{i}].constants[{j}]"))?;
            }
        }

        if self.aggregator.name.is_empty() {
            return Err(ConfigError::Validation(
                "aggregator.name must not be empty".to_string(),
            ));
        }
        for (i, kind) in self.aggregator.desired.iter().enumerate() {
            validate_kind(kind, &format!("aggregator.desired[{i}]"))?;
        }

        Ok(())
    }
}

fn validate_kind(kind: &KindConfig, path: &str) -> Result<(), ConfigError> {
    if kind.name.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{path}.name must not be empty"
        )));
    }
    if kind.data_type.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{path}.type must not be empty"
        )));
    }
    let mut keys = HashSet::new();
    for parameter in &kind.parameters {
        if parameter.key.is_empty() {
            return Err(ConfigError::Validation(format!(
                "{path}.parameters: key must not be empty"
            )));
        }
        if !keys.insert(parameter.key.as_str()) {
            return Err(ConfigError::Validation(format!(
                "{path}.parameters: key {:?} is declared twice",
                parameter.key
            )));
        }
    }
    Ok(())
}
