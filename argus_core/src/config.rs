//! Configuration loading traits and types.
//!
//! TOML configuration in the shared-base style: every process embeds
//! [`SharedConfig`] for identity and logging, plus [`RuntimeConfig`] consumed
//! by the state machine before `run()`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for process logging, lowercase in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string consumed by the tracing filter.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Common configuration fields shared across all ARGUS processes.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// process_name = "argus-drive-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Process instance identifier; also the state-machine name prefix.
    pub process_name: String,
}

impl SharedConfig {
    /// Returns `ConfigError::ValidationError` if `process_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.process_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "process_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Dispatch-loop settings consumed by the state machine before `run()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Bounded condvar wait of the dispatch loop, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Whether events posted while the loop is not running are kept in the
    /// FIFO (true) or discarded (false).
    #[serde(default = "default_buffer_events")]
    pub buffer_events: bool,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_buffer_events() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            buffer_events: default_buffer_events(),
        }
    }
}

impl RuntimeConfig {
    /// Returns `ConfigError::ValidationError` if `poll_interval_ms` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
/// - Returns `ConfigError::ValidationError` if semantic validation fails
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation so any deserializable struct can be loaded.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn log_level_default_is_info() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::default().as_filter(), "info");
    }

    #[test]
    fn shared_config_validation() {
        let ok = SharedConfig {
            log_level: LogLevel::Info,
            process_name: "argus-drive-01".to_string(),
        };
        assert!(ok.validate().is_ok());

        let bad = SharedConfig {
            log_level: LogLevel::Info,
            process_name: String::new(),
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn runtime_config_defaults_and_validation() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.poll_interval_ms, 10);
        assert!(cfg.buffer_events);
        assert!(cfg.validate().is_ok());

        let bad = RuntimeConfig {
            poll_interval_ms: 0,
            buffer_events: true,
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn loader_file_not_found() {
        let result = RuntimeConfig::load(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();
        let result = RuntimeConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn loader_success() {
        #[derive(Debug, Deserialize)]
        struct ProcessConfig {
            shared: SharedConfig,
            runtime: RuntimeConfig,
        }

        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
process_name = "argus-drive-01"

[runtime]
poll_interval_ms = 5
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = ProcessConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.shared.process_name, "argus-drive-01");
        assert_eq!(config.runtime.poll_interval_ms, 5);
        assert!(config.runtime.buffer_events); // default
    }
}
