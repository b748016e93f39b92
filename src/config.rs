//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables**: `PROGD_LISTEN`, `PROGD_STATE_FILE`,
//!    `PROGD_OUTPUT_DIR`, `PROGD_SHELL`
//! 2. **Config file**: path via `--config <path>`, or `progd.toml` in CWD
//! 3. **Compiled defaults**: see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "127.0.0.1:5555"
//! max_connections = 0          # 0 = unbounded
//! max_request_bytes = 65536
//! request_timeout_secs = 30
//!
//! [runner]
//! default_interval = 10
//! shell = "/bin/sh"
//! artifact_extension = "txt"
//!
//! [storage]
//! state_file = "programs_data.json"
//! output_dir = "programs_output"
//!
//! [logging]
//! level = "info"
//! file = "server.log"          # optional, stderr when omitted
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Reasons a configuration cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("runner.default_interval must be at least 1 second")]
    ZeroInterval,
}

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Control-protocol listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `127.0.0.1:5555`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum concurrent connection handlers. `0` leaves it unbounded.
    #[serde(default)]
    pub max_connections: usize,
    /// Largest request payload accepted before the connection is rejected.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
    /// Seconds a client may take to deliver its request (default 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Defaults applied to every program runner.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Global interval used when no state file exists yet (default 10 s).
    #[serde(default = "default_interval")]
    pub default_interval: u64,
    /// Shell binary; programs run as `<shell> -c <name>` (default `/bin/sh`).
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Extension of run artifact files (default `txt`).
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
}

/// On-disk locations.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Durable supervisor state (default `programs_data.json`).
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Root of the per-program output archive (default `programs_output`).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Append log lines to this file instead of stderr.
    pub file: Option<PathBuf>,
}

fn default_listen() -> String {
    "127.0.0.1:5555".to_string()
}
fn default_max_request_bytes() -> usize {
    64 * 1024
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_interval() -> u64 {
    10
}
fn default_shell() -> String {
    "/bin/sh".to_string()
}
fn default_artifact_extension() -> String {
    "txt".to_string()
}
fn default_state_file() -> PathBuf {
    PathBuf::from("programs_data.json")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("programs_output")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_connections: 0,
            max_request_bytes: default_max_request_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_interval: default_interval(),
            shell: default_shell(),
            artifact_extension: default_artifact_extension(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist and parse. Otherwise looks
    /// for `progd.toml` in the current directory, falling back to compiled
    /// defaults.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let path = path.or_else(|| Path::new("progd.toml").exists().then_some("progd.toml"));
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.to_string(),
                    source,
                })?;
                Self::parse(&content)?
            }
            None => Config::default(),
        };

        config.apply_env();
        Ok(config)
    }

    /// Parse a TOML document; missing sections and fields take their defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        if config.runner.default_interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(listen) = std::env::var("PROGD_LISTEN") {
            self.server.listen = listen;
        }
        if let Ok(path) = std::env::var("PROGD_STATE_FILE") {
            self.storage.state_file = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("PROGD_OUTPUT_DIR") {
            self.storage.output_dir = PathBuf::from(path);
        }
        if let Ok(shell) = std::env::var("PROGD_SHELL") {
            self.runner.shell = shell;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:5555");
        assert_eq!(config.server.max_connections, 0);
        assert_eq!(config.runner.default_interval, 10);
        assert_eq!(config.runner.shell, "/bin/sh");
        assert_eq!(config.storage.state_file, PathBuf::from("programs_data.json"));
        assert_eq!(config.storage.output_dir, PathBuf::from("programs_output"));
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = Config::parse(
            "[server]\nlisten = \"0.0.0.0:6000\"\n\n[runner]\ndefault_interval = 3\n",
        )
        .unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:6000");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.runner.default_interval, 3);
        assert_eq!(config.runner.artifact_extension, "txt");
    }

    #[test]
    fn test_logging_file() {
        let config = Config::parse("[logging]\nlevel = \"debug\"\nfile = \"progd.log\"\n").unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, Some(PathBuf::from("progd.log")));
    }

    #[test]
    fn test_rejects_wrong_types() {
        let err = Config::parse("[server]\nmax_connections = \"many\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rejects_zero_default_interval() {
        let err = Config::parse("[runner]\ndefault_interval = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ZeroInterval));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = Config::load(Some(path.to_str().unwrap())).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("absent.toml"));
    }
}
