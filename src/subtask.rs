//! # Subtask Contract
//!
//! A [`Subtask`] is one unit of business work (restart an agent, add a
//! replica, ...). The engine is polymorphic over this trait and never looks
//! inside an implementation: it only decides *which* of `run`, `retry` or
//! `rollback` to call and when.
//!
//! ## Cancellation is advisory
//!
//! Every invocation receives its own [`CancellationToken`]. When an operator
//! cancels an instance, or its timeout elapses, the engine calls
//! [`Subtask::cancel`] with that invocation's token only; other instances of
//! the same kind keep running. The request is best effort. The engine never
//! terminates an in-flight invocation, so a canceled subtask may still finish
//! its side effect after the engine has already recorded it as FAILED.
//! Implementations must therefore be idempotent, or safe to abandon half-way.
//!
//! ## Shared instances
//!
//! One `Arc<dyn Subtask>` is registered per [`Subtask::kind`] and shared by
//! every instance of that kind across all tasks, so implementations carry no
//! per-run state; everything a run needs travels in the [`Context`].

use crate::context::Context;
use async_trait::async_trait;
use std::time::Duration;

pub use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Subtask: Send + Sync {
    /// Human readable name, copied onto every materialized instance
    fn name(&self) -> &str;

    /// Registry key used to find this implementation again after a restart
    fn kind(&self) -> &str {
        self.name()
    }

    /// Budget for one invocation; enforced by polling, not by interruption
    fn timeout_seconds(&self) -> u64;

    /// Automatic re-executions allowed after a failure
    fn retry_count(&self) -> u32 {
        0
    }

    /// When true, a task that has executed this subtask can never be rolled back
    fn prohibit_rollback(&self) -> bool {
        false
    }

    async fn run(&self, context: Context, cancel: CancellationToken) -> anyhow::Result<Context>;

    async fn rollback(&self, context: Context, cancel: CancellationToken) -> anyhow::Result<Context>;

    /// Re-execute after a failure. Undoes the partial attempt first, then runs
    /// again.
    async fn retry(&self, context: Context, cancel: CancellationToken) -> anyhow::Result<Context> {
        let context = self.rollback(context, cancel.clone()).await?;
        self.run(context, cancel).await
    }

    /// Ask the invocation owning `invocation` to stop. Best effort only.
    /// Override to also signal external systems; keep triggering the token.
    fn cancel(&self, invocation: &CancellationToken) {
        invocation.cancel();
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds())
    }
}
