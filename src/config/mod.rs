//! # Engine Configuration
//!
//! Settings for the coordinators, the executor pools, the database and
//! logging. Values are layered by [`ConfigManager`]: built-in defaults, then an
//! optional configuration file, then `OB_TASK_*` environment variables.
//!
//! ```rust,no_run
//! use ob_task_engine::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_file("config/task_engine.toml")?;
//! let poll_interval = manager.config().coordinator.poll_interval();
//! # Ok(())
//! # }
//! ```

pub mod loader;

use crate::constants::defaults;
use crate::error::{Result, TaskEngineError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use loader::ConfigManager;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub coordinator: CoordinatorConfig,
    pub executor: ExecutorConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Reject settings that would stall scheduling
    pub fn validate(&self) -> Result<()> {
        if self.coordinator.poll_interval_ms == 0 {
            return Err(TaskEngineError::ConfigurationError(
                "coordinator.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.coordinator.task_concurrency == 0 {
            return Err(TaskEngineError::ConfigurationError(
                "coordinator.task_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.executor.auto_pool_size == 0 || self.executor.manual_pool_size == 0 {
            return Err(TaskEngineError::ConfigurationError(format!(
                "executor pools must not be empty (auto: {}, manual: {})",
                self.executor.auto_pool_size, self.executor.manual_pool_size
            )));
        }
        if self.database.max_connections == 0 {
            return Err(TaskEngineError::ConfigurationError(
                "database.max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Polling settings shared by all six workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub initial_delay_ms: u64,
    pub poll_interval_ms: u64,
    /// Ceiling on READY + RUNNING + CANCELING subtasks of one task
    pub task_concurrency: usize,
    pub shutdown_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: defaults::INITIAL_DELAY_MS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            task_concurrency: defaults::TASK_CONCURRENCY,
            shutdown_timeout_ms: defaults::SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl CoordinatorConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub auto_pool_size: usize,
    /// Slots reserved for operator-triggered dispatches
    pub manual_pool_size: usize,
    pub retry_rollback_policy: RetryRollbackPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            auto_pool_size: defaults::AUTO_POOL_SIZE,
            manual_pool_size: defaults::MANUAL_POOL_SIZE,
            retry_rollback_policy: RetryRollbackPolicy::default(),
        }
    }
}

/// How a RETRY dispatch treats subtasks that prohibit rollback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryRollbackPolicy {
    /// Always call `Subtask::retry`, whatever the subtask declares
    #[default]
    Always,
    /// Call `Subtask::run` instead of `retry` for subtasks that prohibit rollback
    SkipWhenProhibited,
}

impl fmt::Display for RetryRollbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::SkipWhenProhibited => write!(f, "skip_when_prohibited"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: defaults::DATABASE_MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
