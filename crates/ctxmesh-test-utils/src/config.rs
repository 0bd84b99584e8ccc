//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values, and
//! [`TestConfigFile`] when a test needs the config on disk.

use std::path::PathBuf;

use ctxmesh_config::{AppConfig, KindConfig, TranslationConfig, ValuedKindConfig, WidgetConfig};
use serde_json::Value;
use tempfile::TempDir;

/// A kind without parameters.
pub fn kind(name: &str, data_type: &str) -> KindConfig {
    KindConfig {
        name: name.to_string(),
        data_type: data_type.to_string(),
        parameters: Vec::new(),
    }
}

/// Fluent builder for [`AppConfig`] in tests.
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .translation(kind("CI_LATITUDE", "FLOAT"), kind("latitude", "FLOAT"))
///     .widget("Gps", &[("latitude", "FLOAT", json!(52.5))])
///     .desired(kind("CI_LATITUDE", "FLOAT"))
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn storage_backend(mut self, backend: &str) -> Self {
        self.config.storage.backend = backend.to_string();
        self
    }

    pub fn storage_directory(mut self, directory: &str) -> Self {
        self.config.storage.directory = directory.to_string();
        self
    }

    pub fn flush_count(mut self, count: usize) -> Self {
        self.config.storage.flush_count = count;
        self
    }

    pub fn available_object(mut self, name: &str) -> Self {
        self.config.discoverer.available_objects.push(name.to_string());
        self
    }

    pub fn translation(mut self, from: KindConfig, to: KindConfig) -> Self {
        self.config.translations.push(TranslationConfig { from, to });
        self
    }

    /// A static widget with one output per `(name, type, value)`.
    pub fn widget(mut self, name: &str, outputs: &[(&str, &str, Value)]) -> Self {
        self.config.widgets.push(WidgetConfig {
            name: name.to_string(),
            update_interval_ms: None,
            outputs: outputs
                .iter()
                .map(|(n, t, v)| ValuedKindConfig {
                    kind: kind(n, t),
                    value: Some(v.clone()),
                })
                .collect(),
            constants: Vec::new(),
        });
        self
    }

    pub fn aggregator_name(mut self, name: &str) -> Self {
        self.config.aggregator.name = name.to_string();
        self
    }

    pub fn desired(mut self, kind: KindConfig) -> Self {
        self.config.aggregator.desired.push(kind);
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A config file in a temporary directory, deleted when dropped.
pub struct TestConfigFile {
    pub config: AppConfig,
    pub path: PathBuf,
    temp_dir: TempDir,
}

impl TestConfigFile {
    /// Write `toml_content` to a temporary `ctxmesh.toml` and load it back.
    pub async fn with_toml(toml_content: &str) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("ctxmesh.toml");
        tokio::fs::write(&path, toml_content)
            .await
            .expect("failed to write test config");

        let config = AppConfig::load(&path)
            .await
            .expect("failed to parse test config");

        Self {
            config,
            path,
            temp_dir,
        }
    }

    /// Directory owned by this file, usable as a storage directory.
    pub fn dir(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }
}
