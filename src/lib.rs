#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # OB Task Engine
//!
//! Durable, DAG-based orchestration of long-running cluster operations.
//!
//! ## Overview
//!
//! Operations such as creating a tenant or adding zone replicas are expressed
//! as a [`Template`]: a directed acyclic graph of [`Subtask`]s, optionally
//! fanning out over a sequence found in the submitted [`Context`]. Submitting
//! a template materializes a persisted task instance with one subtask instance
//! per node (or per split element). Two polling coordinators then drive those
//! instances to completion: subtasks run concurrently in dependency order,
//! failures halt forward progress, and operators can retry, skip, cancel or
//! roll back in reverse dependency order.
//!
//! ## Module Organization
//!
//! - [`template`] - Template DAG and builder
//! - [`subtask`] - The contract implemented by business operations
//! - [`context`] - Argument bag threaded through a task's subtasks
//! - [`models`] - Task and subtask instance records
//! - [`state_machine`] - Instance transitions and operator guards
//! - [`persistence`] - Task store contract, in-memory and Postgres stores
//! - [`orchestration`] - Coordinators, polling workers, runner, engine bootstrap
//! - [`services`] - Operator-facing instance managers
//! - [`registry`] - Subtask kind resolution
//! - [`config`] - Layered configuration
//! - [`logging`] / [`metrics`] - Observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use ob_task_engine::persistence::InMemoryTaskStore;
//! use ob_task_engine::{CancellationToken, Context, SplitMethod, Subtask, TaskEngine, TemplateBuilder};
//! use std::sync::Arc;
//!
//! struct AddReplica;
//!
//! #[async_trait]
//! impl Subtask for AddReplica {
//!     fn name(&self) -> &str {
//!         "add replica"
//!     }
//!
//!     fn timeout_seconds(&self) -> u64 {
//!         300
//!     }
//!
//!     async fn run(&self, context: Context, _cancel: CancellationToken) -> anyhow::Result<Context> {
//!         let zone = context.get("zone_names").unwrap_or_default().to_string();
//!         Ok(context.with(format!("replica_{zone}"), "added"))
//!     }
//!
//!     async fn rollback(&self, context: Context, _cancel: CancellationToken) -> anyhow::Result<Context> {
//!         Ok(context)
//!     }
//! }
//!
//! # async fn example() -> ob_task_engine::Result<()> {
//! let engine = TaskEngine::new(Arc::new(InMemoryTaskStore::new()), Default::default())?;
//! engine.start()?;
//!
//! let template = TemplateBuilder::new("add zone replicas")
//!     .and_then_split(Arc::new(AddReplica), "zone_names", SplitMethod::Parallel)
//!     .build();
//! let context = Context::new().with_list("zone_names", ["z1", "z2", "z3"]);
//! let task = engine.submit_task("tenant", &template, context, "admin").await?;
//! assert_eq!(task.subtasks.len(), 3);
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod registry;
pub mod services;
pub mod state_machine;
pub mod subtask;
pub mod template;

pub use config::{ConfigManager, EngineConfig};
pub use context::Context;
pub use error::{Result, TaskEngineError};
pub use models::{
    SubtaskInstance, SubtaskOperation, SubtaskState, TaskInstance, TaskOperation, TaskState,
};
pub use orchestration::{TaskEngine, TaskEngineBuilder};
pub use subtask::{CancellationToken, Subtask};
pub use template::{SplitMethod, Template, TemplateBuilder, TemplateError};
