//! Runtime configuration, loaded from TOML

use crate::error::{Error, Result};
use crate::logging::{parse_level, LogConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Cap on bytes handed to native code; unlimited when absent
    #[serde(default)]
    pub limit_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Re-evaluate bridged object strength after every native call
    #[serde(default = "default_true")]
    pub sweep_on_boundary: bool,

    #[serde(default)]
    pub sweep_policy: SweepPolicy,
}

/// What a strength sweep does when a bridged object was reclaimed too early
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SweepPolicy {
    /// Abort the sweep with `PrematureCollection`
    #[default]
    FailFast,
    /// Log the entry, count it, and keep sweeping
    Isolate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    #[serde(default)]
    pub file: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { sweep_on_boundary: true, sweep_policy: SweepPolicy::FailFast }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_level(), json: false, file: None }
    }
}

fn default_true() -> bool { true }
fn default_level() -> String { "info".to_string() }

impl RuntimeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Logging settings, with `TYPTHON_EXT_LOG_*` overrides applied
    pub fn log_config(&self) -> LogConfig {
        let base = LogConfig {
            level: parse_level(&self.logging.level).unwrap_or(tracing::Level::INFO),
            log_path: self.logging.file.clone(),
            json_format: self.logging.json,
        };
        base.with_env_overrides()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_empty() {
        let config = RuntimeConfig::parse("").unwrap();
        assert_eq!(config.memory.limit_bytes, None);
        assert!(config.bridge.sweep_on_boundary);
        assert_eq!(config.bridge.sweep_policy, SweepPolicy::FailFast);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parses_all_sections() {
        let config = RuntimeConfig::parse(
            r#"
            [memory]
            limit_bytes = 4096

            [bridge]
            sweep_on_boundary = false
            sweep_policy = "isolate"

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.memory.limit_bytes, Some(4096));
        assert!(!config.bridge.sweep_on_boundary);
        assert_eq!(config.bridge.sweep_policy, SweepPolicy::Isolate);
        assert!(config.logging.json);
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = RuntimeConfig::parse("[bridge]\nsweep_policy = \"lazy\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[memory]\nlimit_bytes = 128").unwrap();

        let config = RuntimeConfig::load(file.path()).unwrap();
        assert_eq!(config.memory.limit_bytes, Some(128));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = RuntimeConfig::load(Path::new("/nonexistent/typthon-ext.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
