//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and `CA_*`
//! environment variables, and merging configurations with proper precedence
//! rules.

use crate::error::AggregatorError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration loaded from TOML files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Default values for CLI options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    /// Output formatting preferences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,
}

/// Default configuration values that map to CLI options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DefaultsConfig {
    /// Workers per batch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Fetches admitted per second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<u32>,

    /// Rate gate burst capacity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,

    /// Batch deadline (as string, e.g., "30s", "2m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Per-request fetch timeout (as string, e.g., "500ms", "10s")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_timeout: Option<String>,

    /// Response body cap in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_body_bytes: Option<usize>,

    /// `User-Agent` header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Default output format ("text", "pretty", "json" or "csv")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_format: Option<String>,

    /// Pretty-print JSON by default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_pretty: Option<bool>,
}

const OUTPUT_FORMATS: [&str; 4] = ["text", "pretty", "json", "csv"];

/// Configuration discovery and loading functionality.
#[derive(Debug, Clone, Default)]
pub struct ConfigManager;

impl ConfigManager {
    /// Create a new configuration manager.
    pub fn new() -> Self {
        Self
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns a [`AggregatorError::FileError`] if the file is missing or
    /// unreadable, and a [`AggregatorError::ConfigError`] if it is not valid
    /// TOML or fails validation.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, AggregatorError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(AggregatorError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            AggregatorError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            AggregatorError::config(format!("Failed to parse TOML configuration: {}", e))
        })?;

        self.validate_config(&config)?;
        debug!(path = %path.display(), "loaded configuration file");

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG config is lowest, then the global file in `$HOME`, then a local
    /// file in the working directory.
    pub fn discover_and_load(&self) -> Result<FileConfig, AggregatorError> {
        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    merged_config = self.merge_configs(merged_config, config);
                    loaded_files.push(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "ignoring configuration file"),
            }
        }

        if loaded_files.len() > 1 {
            info!(
                files = ?loaded_files,
                "multiple config files found, later files take precedence"
            );
        }

        Ok(merged_config)
    }

    /// Local configuration file in the current directory.
    fn get_local_config_path(&self) -> Option<PathBuf> {
        let candidates = ["./content-aggregator.toml", "./.content-aggregator.toml"];

        candidates
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    /// Global configuration file in the user's home directory.
    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        let candidates = [".content-aggregator.toml", "content-aggregator.toml"];

        candidates
            .iter()
            .map(|candidate| Path::new(&home).join(candidate))
            .find(|path| path.exists())
    }

    /// XDG configuration file.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("content-aggregator").join("config.toml");
        if path.exists() {
            Some(path)
        } else {
            None
        }
    }

    /// Merge two configurations; values from `higher` win field by field.
    pub fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            defaults: match (lower.defaults, higher.defaults) {
                (Some(lower_defaults), Some(higher_defaults)) => Some(DefaultsConfig {
                    workers: higher_defaults.workers.or(lower_defaults.workers),
                    rate: higher_defaults.rate.or(lower_defaults.rate),
                    burst: higher_defaults.burst.or(lower_defaults.burst),
                    timeout: higher_defaults.timeout.or(lower_defaults.timeout),
                    fetch_timeout: higher_defaults.fetch_timeout.or(lower_defaults.fetch_timeout),
                    max_body_bytes: higher_defaults
                        .max_body_bytes
                        .or(lower_defaults.max_body_bytes),
                    user_agent: higher_defaults.user_agent.or(lower_defaults.user_agent),
                }),
                (lower_defaults, higher_defaults) => higher_defaults.or(lower_defaults),
            },
            output: match (lower.output, higher.output) {
                (Some(lower_output), Some(higher_output)) => Some(OutputConfig {
                    default_format: higher_output.default_format.or(lower_output.default_format),
                    json_pretty: higher_output.json_pretty.or(lower_output.json_pretty),
                }),
                (lower_output, higher_output) => higher_output.or(lower_output),
            },
        }
    }

    /// Validate a configuration for common issues.
    pub fn validate_config(&self, config: &FileConfig) -> Result<(), AggregatorError> {
        if let Some(defaults) = &config.defaults {
            if let Some(workers) = defaults.workers {
                if workers == 0 || workers > 100 {
                    return Err(AggregatorError::config(
                        "Workers must be between 1 and 100",
                    ));
                }
            }

            if defaults.rate == Some(0) {
                return Err(AggregatorError::config("Rate must be positive"));
            }

            if defaults.burst == Some(0) {
                return Err(AggregatorError::config("Burst must be positive"));
            }

            if defaults.max_body_bytes == Some(0) {
                return Err(AggregatorError::config("max_body_bytes must be positive"));
            }

            for (key, value) in [
                ("timeout", &defaults.timeout),
                ("fetch_timeout", &defaults.fetch_timeout),
            ] {
                if let Some(value) = value {
                    if parse_duration(value).is_none() {
                        return Err(AggregatorError::config(format!(
                            "Invalid {} format '{}'. Use format like '500ms', '5s', '2m'",
                            key, value
                        )));
                    }
                }
            }

            if let Some(user_agent) = &defaults.user_agent {
                if user_agent.trim().is_empty() {
                    return Err(AggregatorError::config("user_agent cannot be empty"));
                }
            }
        }

        if let Some(format) = config
            .output
            .as_ref()
            .and_then(|output| output.default_format.as_deref())
        {
            if !OUTPUT_FORMATS.contains(&format) {
                return Err(AggregatorError::config(format!(
                    "Unknown output format '{}'. Expected one of: {}",
                    format,
                    OUTPUT_FORMATS.join(", ")
                )));
            }
        }

        Ok(())
    }
}

/// Environment variable configuration that mirrors CLI options.
///
/// This represents configuration values that can be set via `CA_*`
/// environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub workers: Option<usize>,
    pub rate: Option<u32>,
    pub burst: Option<u32>,
    pub timeout: Option<String>,
    pub fetch_timeout: Option<String>,
    pub user_agent: Option<String>,
    pub pretty: Option<bool>,
    pub json: Option<bool>,
    pub csv: Option<bool>,
    pub file: Option<String>,
    pub config: Option<String>,
}

impl EnvConfig {
    /// Check if output format conflicts exist (JSON and CSV both set).
    pub fn has_output_format_conflict(&self) -> bool {
        matches!((self.json, self.csv), (Some(true), Some(true)))
    }
}

/// Load configuration from the process environment.
///
/// Invalid values are logged as warnings and ignored.
pub fn load_env_config() -> EnvConfig {
    load_env_config_from(|key| env::var(key).ok())
}

/// Load configuration through an arbitrary variable lookup.
pub fn load_env_config_from<F>(lookup: F) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut env_config = EnvConfig::default();

    // CA_WORKERS - workers per batch
    if let Some(val) = lookup("CA_WORKERS") {
        match val.trim().parse::<usize>() {
            Ok(workers) if (1..=100).contains(&workers) => {
                debug!(workers, "using CA_WORKERS");
                env_config.workers = Some(workers);
            }
            _ => warn!(value = %val, "invalid CA_WORKERS, must be 1-100"),
        }
    }

    env_config.rate = parse_positive(&lookup, "CA_RATE");
    env_config.burst = parse_positive(&lookup, "CA_BURST");
    env_config.timeout = parse_duration_var(&lookup, "CA_TIMEOUT");
    env_config.fetch_timeout = parse_duration_var(&lookup, "CA_FETCH_TIMEOUT");

    // CA_USER_AGENT - User-Agent header
    if let Some(user_agent) = lookup("CA_USER_AGENT") {
        if !user_agent.trim().is_empty() {
            debug!(user_agent = %user_agent, "using CA_USER_AGENT");
            env_config.user_agent = Some(user_agent);
        }
    }

    env_config.pretty = parse_bool(&lookup, "CA_PRETTY");
    env_config.json = parse_bool(&lookup, "CA_JSON");
    env_config.csv = parse_bool(&lookup, "CA_CSV");

    // CA_FILE - default item list
    if let Some(file_path) = lookup("CA_FILE") {
        if !file_path.trim().is_empty() {
            debug!(file = %file_path, "using CA_FILE");
            env_config.file = Some(file_path);
        }
    }

    // CA_CONFIG - explicit config file
    if let Some(config_path) = lookup("CA_CONFIG") {
        if !config_path.trim().is_empty() {
            debug!(config = %config_path, "using CA_CONFIG");
            env_config.config = Some(config_path);
        }
    }

    env_config
}

fn parse_positive<F>(lookup: &F, key: &str) -> Option<u32>
where
    F: Fn(&str) -> Option<String>,
{
    let val = lookup(key)?;
    match val.trim().parse::<u32>() {
        Ok(n) if n > 0 => {
            debug!(value = n, "using {}", key);
            Some(n)
        }
        _ => {
            warn!(value = %val, "invalid {}, must be a positive integer", key);
            None
        }
    }
}

fn parse_duration_var<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let val = lookup(key)?;
    if parse_duration(&val).is_some() {
        debug!(value = %val, "using {}", key);
        Some(val)
    } else {
        warn!(value = %val, "invalid {}, use format like '500ms', '5s', '2m'", key);
        None
    }
}

fn parse_bool<F>(lookup: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let val = lookup(key)?;
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            warn!(value = %val, "invalid {}, use true/false", key);
            None
        }
    }
}

/// Parse a duration like "500ms", "5s", "2m" or bare seconds ("5").
///
/// Returns `None` for malformed input and for a zero duration.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim().to_lowercase();

    let duration = if let Some(ms) = input.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = input.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = input.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        input.parse::<u64>().ok().map(Duration::from_secs)
    };

    duration.filter(|d| !d.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    fn env_from(pairs: &[(&str, &str)]) -> EnvConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load_env_config_from(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration(" 30S "), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("0s"), None);
        assert_eq!(parse_duration("invalid"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_load_valid_config() {
        let temp_file = write_config(
            r#"
[defaults]
workers = 8
rate = 5
burst = 10
timeout = "1m"
fetch_timeout = "500ms"
user_agent = "TestAgent/2.0"

[output]
default_format = "json"
json_pretty = true
"#,
        );

        let config = ConfigManager::new().load_file(temp_file.path()).unwrap();

        let defaults = config.defaults.unwrap();
        assert_eq!(defaults.workers, Some(8));
        assert_eq!(defaults.rate, Some(5));
        assert_eq!(defaults.burst, Some(10));
        assert_eq!(defaults.timeout.as_deref(), Some("1m"));
        assert_eq!(defaults.user_agent.as_deref(), Some("TestAgent/2.0"));

        let output = config.output.unwrap();
        assert_eq!(output.default_format.as_deref(), Some("json"));
        assert_eq!(output.json_pretty, Some(true));
    }

    #[test]
    fn test_invalid_workers() {
        let temp_file = write_config("[defaults]\nworkers = 0\n");
        let result = ConfigManager::new().load_file(temp_file.path());
        assert!(matches!(result, Err(AggregatorError::ConfigError { .. })));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let manager = ConfigManager::new();
        for content in [
            "[defaults]\nrate = 0\n",
            "[defaults]\nburst = 0\n",
            "[defaults]\ntimeout = \"soon\"\n",
            "[defaults]\nfetch_timeout = \"0s\"\n",
            "[output]\ndefault_format = \"xml\"\n",
            "not toml at all [",
        ] {
            let temp_file = write_config(content);
            assert!(
                manager.load_file(temp_file.path()).is_err(),
                "accepted: {}",
                content
            );
        }
    }

    #[test]
    fn test_missing_file_is_file_error() {
        let result = ConfigManager::new().load_file("/definitely/not/here.toml");
        assert!(matches!(result, Err(AggregatorError::FileError { .. })));
    }

    #[test]
    fn test_merge_configs() {
        let manager = ConfigManager::new();

        let lower = FileConfig {
            defaults: Some(DefaultsConfig {
                workers: Some(10),
                rate: Some(2),
                user_agent: Some("Lower/1.0".to_string()),
                ..Default::default()
            }),
            output: Some(OutputConfig {
                default_format: Some("csv".to_string()),
                json_pretty: Some(false),
            }),
        };

        let higher = FileConfig {
            defaults: Some(DefaultsConfig {
                workers: Some(25),
                burst: Some(4),
                ..Default::default()
            }),
            output: Some(OutputConfig {
                json_pretty: Some(true),
                ..Default::default()
            }),
        };

        let merged = manager.merge_configs(lower, higher);
        let defaults = merged.defaults.unwrap();
        assert_eq!(defaults.workers, Some(25)); // Higher wins
        assert_eq!(defaults.rate, Some(2)); // Lower preserved
        assert_eq!(defaults.burst, Some(4));
        assert_eq!(defaults.user_agent.as_deref(), Some("Lower/1.0"));

        let output = merged.output.unwrap();
        assert_eq!(output.default_format.as_deref(), Some("csv"));
        assert_eq!(output.json_pretty, Some(true));
    }

    #[test]
    fn test_env_config_parses_valid_values() {
        let env = env_from(&[
            ("CA_WORKERS", "6"),
            ("CA_RATE", "4"),
            ("CA_BURST", "8"),
            ("CA_TIMEOUT", "45s"),
            ("CA_FETCH_TIMEOUT", "750ms"),
            ("CA_USER_AGENT", "EnvAgent/1.0"),
            ("CA_JSON", "yes"),
            ("CA_CSV", "off"),
            ("CA_FILE", "urls.txt"),
        ]);

        assert_eq!(env.workers, Some(6));
        assert_eq!(env.rate, Some(4));
        assert_eq!(env.burst, Some(8));
        assert_eq!(env.timeout.as_deref(), Some("45s"));
        assert_eq!(env.fetch_timeout.as_deref(), Some("750ms"));
        assert_eq!(env.user_agent.as_deref(), Some("EnvAgent/1.0"));
        assert_eq!(env.json, Some(true));
        assert_eq!(env.csv, Some(false));
        assert_eq!(env.file.as_deref(), Some("urls.txt"));
        assert!(!env.has_output_format_conflict());
    }

    #[test]
    fn test_env_config_ignores_invalid_values() {
        let env = env_from(&[
            ("CA_WORKERS", "0"),
            ("CA_RATE", "-3"),
            ("CA_BURST", "lots"),
            ("CA_TIMEOUT", "whenever"),
            ("CA_JSON", "maybe"),
            ("CA_FILE", "   "),
        ]);

        assert_eq!(env.workers, None);
        assert_eq!(env.rate, None);
        assert_eq!(env.burst, None);
        assert_eq!(env.timeout, None);
        assert_eq!(env.json, None);
        assert_eq!(env.file, None);
    }

    #[test]
    fn test_zero_durations_rejected() {
        let env = env_from(&[("CA_TIMEOUT", "0s"), ("CA_FETCH_TIMEOUT", "0ms")]);
        assert_eq!(env.timeout, None);
        assert_eq!(env.fetch_timeout, None);

        let temp_file = write_config("[defaults]\ntimeout = \"0\"\n");
        assert!(ConfigManager::new().load_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_env_output_conflict() {
        let env = env_from(&[("CA_JSON", "true"), ("CA_CSV", "1")]);
        assert!(env.has_output_format_conflict());
    }
}
