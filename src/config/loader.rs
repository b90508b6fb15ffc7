//! Configuration Loader
//!
//! Environment-aware loading built on the `config` crate. Sources are layered
//! in increasing precedence:
//!
//! 1. built-in defaults
//! 2. `<dir>/reviewflow.toml`
//! 3. `<dir>/reviewflow.<environment>.toml`
//! 4. `REVIEWFLOW__SECTION__KEY` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::ReviewConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE_STEM: &str = "reviewflow";
const ENV_PREFIX: &str = "REVIEWFLOW";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug)]
pub struct ConfigManager {
    config: ReviewConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for testing without touching global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        let sanitized = Self::sanitize_config_for_logging(&config);
        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string(&sanitized)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = %environment,
            concurrency_mode = %config.engine.concurrency_mode,
            cache_enabled = config.cache.enabled,
            max_connections = config.database.max_connections,
            "Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: ReviewConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with sensitive fields masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    fn load_and_merge_config(config_dir: &Path, environment: &str) -> ConfigResult<ReviewConfig> {
        let defaults = Config::try_from(&ReviewConfig::default())
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        let base_path = config_dir.join(format!("{BASE_FILE_STEM}.toml"));
        let env_path = config_dir.join(format!("{BASE_FILE_STEM}.{environment}.toml"));

        debug!(
            base = %base_path.display(),
            base_exists = base_path.exists(),
            overrides = %env_path.display(),
            overrides_exist = env_path.exists(),
            "Resolving configuration sources"
        );

        Config::builder()
            .add_source(defaults)
            .add_source(File::from(base_path).format(FileFormat::Toml).required(false))
            .add_source(File::from(env_path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .and_then(|merged| merged.try_deserialize::<ReviewConfig>())
            .map_err(|e| ConfigurationError::load_error(environment, e))
    }

    fn sanitize_config_for_logging(config: &ReviewConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "key", "token", "credential", "url"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive && val.is_string() {
                        *val = serde_json::Value::String("***REDACTED***".to_string());
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }

    /// `REVIEWFLOW_ENV`, then `APP_ENV`, default `development`
    pub fn detect_environment() -> String {
        env::var("REVIEWFLOW_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_masks_database_url() {
        let manager = ConfigManager::from_config(ReviewConfig::default(), "test").unwrap();
        let json = manager.debug_config();
        assert_eq!(json["database"]["url"], "***REDACTED***");
        assert_eq!(json["database"]["max_connections"], 10);
        assert_eq!(json["engine"]["admin_permission"], "admin_manage");
    }

    #[test]
    fn test_missing_directory_yields_defaults() {
        let manager = ConfigManager::load_from_directory_with_env(
            Some(PathBuf::from("/nonexistent/reviewflow/config")),
            "test",
        )
        .unwrap();
        assert_eq!(manager.config().cache.workload_ttl_seconds, 30);
        assert_eq!(manager.environment(), "test");
    }
}
