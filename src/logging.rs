//! # Structured Logging Module
//!
//! Installs the global `tracing` subscriber for processes embedding the
//! engine, and provides the canonical log events emitted for operator
//! mutations and terminal transitions.

use crate::config::LoggingConfig;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging. `RUST_LOG`, when set, overrides the
/// configured level. Safe to call more than once.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

        let layer = if config.json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(filter)
                .boxed()
        };

        // Use try_init to avoid panic if global subscriber already set
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            level = %config.level,
            json = config.json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Log structured data for task operations
pub fn log_task_operation(operation: &str, task_id: i64, task_name: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        task_id = task_id,
        task_name = %task_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 TASK_OPERATION"
    );
}

/// Log structured data for subtask operations
pub fn log_subtask_operation(
    operation: &str,
    task_id: i64,
    subtask_id: i64,
    subtask_name: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_id = task_id,
        subtask_id = subtask_id,
        subtask_name = %subtask_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔧 SUBTASK_OPERATION"
    );
}
