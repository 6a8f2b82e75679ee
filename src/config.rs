//! Benchmark configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! the `FSPROBE_BENCHMARK_ENABLE` environment variable. Command line flags are
//! applied on top by the binary.
//!
//! # Example fsprobe.toml
//!
//! ```toml
//! [benchmark]
//! enable = true
//! warmup_iterations = 2
//! measurement_iterations = 10
//! timeout_secs = 60
//! report_dir = "bench-reports"
//! scratch_dir = ".fsprobe-bench"
//! ```

use crate::harness::{HarnessOptions, DEFAULT_SCRATCH_DIR};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that enables or disables benchmarking
pub const ENABLE_ENV: &str = "FSPROBE_BENCHMARK_ENABLE";
/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "FSPROBE_CONFIG";

const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value '{value}' for {name} (expected true/false, 1/0, yes/no or on/off)")]
    InvalidEnv { name: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration for fsprobe.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
}

/// The `[benchmark]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkConfig {
    /// Seeds the toggle: measure the next eligible call
    pub enable: bool,
    pub warmup_iterations: u32,
    pub measurement_iterations: u32,
    /// Child process timeout; 0 disables it
    pub timeout_secs: u64,
    /// Where JSON reports are written, if anywhere
    pub report_dir: Option<PathBuf>,
    pub scratch_dir: String,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        let harness = HarnessOptions::default();
        Self {
            enable: false,
            warmup_iterations: harness.warmup_iterations,
            measurement_iterations: harness.measurement_iterations,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            report_dir: None,
            scratch_dir: DEFAULT_SCRATCH_DIR.to_string(),
        }
    }
}

impl ProbeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve defaults, the config file (`explicit` or `FSPROBE_CONFIG`) and
    /// the environment, in that order
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`
    pub fn apply_env_from<L>(&mut self, lookup: L) -> Result<(), ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENABLE_ENV) {
            self.benchmark.enable = parse_bool(&raw).ok_or_else(|| ConfigError::InvalidEnv {
                name: ENABLE_ENV.to_string(),
                value: raw.clone(),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.benchmark.measurement_iterations == 0 {
            return Err(ConfigError::Invalid(
                "measurement_iterations must be at least 1".to_string(),
            ));
        }
        let scratch = self.benchmark.scratch_dir.trim_matches('/');
        if scratch.is_empty() || scratch.split('/').any(|part| part == "..") {
            return Err(ConfigError::Invalid(format!(
                "scratch_dir '{}' must be a relative directory inside the bucket",
                self.benchmark.scratch_dir
            )));
        }
        Ok(())
    }

    pub fn harness_options(&self) -> HarnessOptions {
        HarnessOptions {
            warmup_iterations: self.benchmark.warmup_iterations,
            measurement_iterations: self.benchmark.measurement_iterations,
            scratch_dir: self.benchmark.scratch_dir.clone(),
        }
    }

    /// Child process timeout, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.benchmark.timeout_secs > 0).then(|| Duration::from_secs(self.benchmark.timeout_secs))
    }
}

/// Lenient boolean parsing for environment values
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ProbeConfig::default();
        assert!(!config.benchmark.enable);
        assert_eq!(config.benchmark.warmup_iterations, 1);
        assert_eq!(config.benchmark.measurement_iterations, 3);
        assert_eq!(config.timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.benchmark.scratch_dir, ".fsprobe-bench");
        assert!(config.benchmark.report_dir.is_none());
    }

    #[test]
    fn test_parse_partial_table() {
        let config = ProbeConfig::from_toml_str(
            r#"
            [benchmark]
            enable = true
            measurement_iterations = 10
            timeout_secs = 0
            "#,
        )
        .unwrap();
        assert!(config.benchmark.enable);
        assert_eq!(config.benchmark.measurement_iterations, 10);
        assert_eq!(config.benchmark.warmup_iterations, 1);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(ProbeConfig::from_toml_str("").unwrap(), ProbeConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ProbeConfig::from_toml_str("[benchmark]\nenabled = true\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[benchmark]\nreport_dir = \"out\"").unwrap();
        let config = ProbeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.benchmark.report_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_missing_file() {
        let result = ProbeConfig::from_file("/nonexistent/fsprobe.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = ProbeConfig::from_toml_str("[benchmark]\nenable = true").unwrap();
        config
            .apply_env_from(|name| (name == ENABLE_ENV).then(|| "off".to_string()))
            .unwrap();
        assert!(!config.benchmark.enable);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = ProbeConfig::default();
        let err = config
            .apply_env_from(|_| Some("maybe".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("maybe"));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool(" TRUE "), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("No"), Some(false));
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_validate() {
        let mut config = ProbeConfig::default();
        config.benchmark.measurement_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = ProbeConfig::default();
        config.benchmark.scratch_dir = "a/../..".into();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_from_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[benchmark]\nwarmup_iterations = 4").unwrap();
        std::env::set_var(CONFIG_ENV, file.path());
        std::env::set_var(ENABLE_ENV, "yes");

        let config = ProbeConfig::load(None);

        std::env::remove_var(CONFIG_ENV);
        std::env::remove_var(ENABLE_ENV);
        let config = config.unwrap();
        assert_eq!(config.benchmark.warmup_iterations, 4);
        assert!(config.benchmark.enable);
    }
}
