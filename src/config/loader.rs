//! Configuration Loader
//!
//! Layers built-in defaults, an optional file and environment variables with
//! the `config` crate. The file format follows the extension (`.toml`,
//! `.yaml`, `.json`). Environment variables use the `OB_TASK_` prefix and a
//! double underscore between sections, e.g.
//! `OB_TASK_COORDINATOR__POLL_INTERVAL_MS=500`.

use super::EngineConfig;
use crate::error::Result;
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "OB_TASK";

/// Loaded and validated engine configuration
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: EngineConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Defaults overridden by environment variables only
    pub fn load() -> Result<Arc<ConfigManager>> {
        Self::build(None)
    }

    /// Defaults, then `path` if it exists, then environment variables
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Arc<ConfigManager>> {
        Self::build(Some(path.as_ref().to_path_buf()))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: EngineConfig) -> Result<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            source: None,
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// File the configuration was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn build(path: Option<PathBuf>) -> Result<Arc<ConfigManager>> {
        let mut builder = Config::builder().add_source(Config::try_from(&EngineConfig::default())?);

        if let Some(path) = &path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path.as_path()).required(false));
        }

        let config: EngineConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        info!(
            poll_interval_ms = config.coordinator.poll_interval_ms,
            task_concurrency = config.coordinator.task_concurrency,
            auto_pool_size = config.executor.auto_pool_size,
            manual_pool_size = config.executor.manual_pool_size,
            retry_rollback_policy = %config.executor.retry_rollback_policy,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            source: path,
        }))
    }
}
