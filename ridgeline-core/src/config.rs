//! # Configuration Management
//!
//! Handles all configuration for Ridgeline components.
//!
//! Configuration is read from a YAML file and then overridden by
//! `RIDGELINE_*` environment variables. Every section has defaults, so an
//! empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Decay constant of the distance-to-similarity transform
pub const DEFAULT_SIMILARITY_SCALE: f64 = 20.0;

/// Per-dimension absolute tolerance for exact-row resolution
pub const DEFAULT_MATCH_TOLERANCE: f64 = 1e-10;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
    pub api: ApiConfig,
    pub search_log: SearchLogConfig,
    pub logging: LoggingConfig,
}

/// Rebuild inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Raw N×D feature matrix (`.npy`)
    pub vectors_path: PathBuf,
    /// Per-item metadata (JSON array with `filename`)
    pub metadata_path: PathBuf,
    /// Directory holding the indexed images, served by name
    pub images_dir: Option<PathBuf>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            vectors_path: PathBuf::from("./data/features/vectors.npy"),
            metadata_path: PathBuf::from("./data/features/metadata.json"),
            images_dir: None,
        }
    }
}

/// Persisted index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub dir: PathBuf,
    /// Previous generations kept on disk after a successful rebuild
    pub keep_generations: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/index"),
            keep_generations: 1,
        }
    }
}

/// Query-time parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub similarity_scale: f64,
    pub match_tolerance: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 10,
            max_top_k: 1000,
            similarity_scale: DEFAULT_SIMILARITY_SCALE,
            match_tolerance: DEFAULT_MATCH_TOLERANCE,
        }
    }
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: String,
    pub http_port: u16,
    pub max_request_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 5000,
            max_request_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// On-disk record of served searches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchLogConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for SearchLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("./data/searches"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
        }
    }
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Load configuration from a YAML file, then apply environment overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::Configuration {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let mut config: Config = serde_yaml::from_str(&content).map_err(|e| Error::Configuration {
            message: format!("Failed to parse YAML: {}", e),
        })?;

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `RIDGELINE_*` environment variables.
    ///
    /// Supported variables:
    /// - RIDGELINE_VECTORS_PATH
    /// - RIDGELINE_METADATA_PATH
    /// - RIDGELINE_IMAGES_DIR
    /// - RIDGELINE_INDEX_DIR
    /// - RIDGELINE_HTTP_PORT
    /// - RIDGELINE_LOG_LEVEL
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("RIDGELINE_VECTORS_PATH") {
            self.dataset.vectors_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("RIDGELINE_METADATA_PATH") {
            self.dataset.metadata_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("RIDGELINE_IMAGES_DIR") {
            self.dataset.images_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("RIDGELINE_INDEX_DIR") {
            self.index.dir = PathBuf::from(v);
        }
        if let Some(port) = lookup("RIDGELINE_HTTP_PORT").and_then(|v| v.parse().ok()) {
            self.api.http_port = port;
        }
        if let Some(level) = lookup("RIDGELINE_LOG_LEVEL")
            .and_then(|v| serde_yaml::from_str::<LogLevel>(&v.to_lowercase()).ok())
        {
            self.logging.level = level;
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.search.default_top_k == 0 {
            return Err(Error::Configuration {
                message: "search.default_top_k must be at least 1".to_string(),
            });
        }
        if self.search.max_top_k < self.search.default_top_k {
            return Err(Error::Configuration {
                message: format!(
                    "search.max_top_k ({}) is smaller than search.default_top_k ({})",
                    self.search.max_top_k, self.search.default_top_k
                ),
            });
        }
        if !(self.search.similarity_scale > 0.0) {
            return Err(Error::Configuration {
                message: "search.similarity_scale must be positive".to_string(),
            });
        }
        if !(self.search.match_tolerance >= 0.0) {
            return Err(Error::Configuration {
                message: "search.match_tolerance must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.search.similarity_scale, 20.0);
        assert_eq!(config.search.match_tolerance, 1e-10);
    }

    #[test]
    fn test_partial_yaml() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ridgeline.yaml");
        std::fs::write(
            &path,
            "index:\n  dir: /srv/index\nsearch:\n  default_top_k: 5\nlogging:\n  format: json\n",
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.index.dir, PathBuf::from("/srv/index"));
        assert_eq!(config.index.keep_generations, 1);
        assert_eq!(config.search.default_top_k, 5);
        assert_eq!(config.search.max_top_k, 1000);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RIDGELINE_INDEX_DIR", "/tmp/idx"),
            ("RIDGELINE_HTTP_PORT", "8088"),
            ("RIDGELINE_LOG_LEVEL", "DEBUG"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.index.dir, PathBuf::from("/tmp/idx"));
        assert_eq!(config.api.http_port, 8088);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_invalid_top_k() {
        let mut config = Config::default();
        config.search.max_top_k = 3;
        assert!(matches!(config.validate(), Err(Error::Configuration { .. })));
    }
}
