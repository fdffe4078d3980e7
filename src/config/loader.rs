//! Configuration Loader
//!
//! Environment-aware configuration loading: YAML file discovery, environment detection,
//! environment section merging and `${VAR}` expansion.

use super::error::{ConfigResult, ConfigurationError};
use super::RewardsBatchConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_NAMES: [&str; 2] = ["rewards-batch.yaml", "rewards-batch.yml"];
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];

/// Loaded configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: RewardsBatchConfig,
    environment: String,
    config_directory: PathBuf,
    /// None when built-in defaults were used
    config_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config_file = Self::find_config_file(&config_directory)?;
        let config = Self::load_and_merge_config(&config_file, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            config_file = %config_file.display(),
            partition_size = config.job.partition_size,
            chunk_size = config.job.chunk_size,
            max_concurrency = config.job.max_concurrency,
            skip_limit = config.fault_tolerance.skip_limit,
            retry_limit = config.fault_tolerance.retry_limit,
            database_url = %Self::mask_url(config.database.url.as_deref()),
            "⚙️ Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
            config_file: Some(config_file),
        }))
    }

    /// Like [`load_from_directory_with_env`](Self::load_from_directory_with_env), but a
    /// missing configuration file yields the built-in defaults
    ///
    /// Parse and validation failures are still errors.
    pub fn load_or_default_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        match Self::load_from_directory_with_env(config_dir.clone(), environment) {
            Err(error) if error.is_not_found() => {
                debug!(%error, "No configuration file found - using built-in defaults");
                Ok(Arc::new(Self::with_defaults(
                    config_dir.unwrap_or_else(Self::default_config_directory),
                    environment,
                )))
            }
            other => other,
        }
    }

    fn with_defaults(config_directory: PathBuf, environment: &str) -> ConfigManager {
        ConfigManager {
            config: RewardsBatchConfig::default(),
            environment: environment.to_string(),
            config_directory,
            config_file: None,
        }
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &RewardsBatchConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        crate::logging::get_environment()
    }

    fn default_config_directory() -> PathBuf {
        if let Ok(dir) = env::var("REWARDS_BATCH_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        PathBuf::from("config")
    }

    /// Find the configuration file
    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.is_file() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    /// Load and merge configuration with environment-specific overrides
    fn load_and_merge_config(
        config_file: &Path,
        environment: &str,
    ) -> ConfigResult<RewardsBatchConfig> {
        let yaml_content = std::fs::read_to_string(config_file)
            .map_err(|e| {
                ConfigurationError::file_read_error(config_file.display().to_string(), e)
            })?;

        // An empty file is a valid document that selects every default
        let mut yaml_data: YamlValue = if yaml_content.trim().is_empty() {
            YamlValue::Mapping(Default::default())
        } else {
            serde_yaml::from_str(&yaml_content)
                .map_err(|e| {
                    ConfigurationError::invalid_yaml(config_file.display().to_string(), e)
                })?
        };

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(
                "Applying environment-specific overrides for: {}",
                environment
            );
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
        }

        let mut config: RewardsBatchConfig = serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })?;

        if let Some(url) = config.database.url.take() {
            config.database.url = Some(expand_env_vars(&url)?);
        }

        Ok(config)
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }

    /// Hide the password of a connection URL for logging
    fn mask_url(url: Option<&str>) -> String {
        let Some(url) = url else {
            return "[NONE]".to_string();
        };
        match (url.find("://"), url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                let credentials = &url[scheme_end + 3..at];
                match credentials.find(':') {
                    Some(colon) => format!(
                        "{}{}:***{}",
                        &url[..scheme_end + 3],
                        &credentials[..colon],
                        &url[at..]
                    ),
                    None => url.to_string(),
                }
            }
            _ => url.to_string(),
        }
    }
}

/// Replace every `${NAME}` in `value` with the value of environment variable `NAME`
fn expand_env_vars(value: &str) -> ConfigResult<String> {
    let mut expanded = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            ConfigurationError::environment_variable(after, "unterminated '${' reference")
        })?;
        let name = &after[..end];
        let resolved = env::var(name).map_err(|_| {
            ConfigurationError::environment_variable(name, "variable is not set")
        })?;
        expanded.push_str(&resolved);
        rest = &after[end + 1..];
    }

    expanded.push_str(rest);
    Ok(expanded)
}
