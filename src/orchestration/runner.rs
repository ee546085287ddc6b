//! # Runner
//!
//! The single place where subtask bodies are invoked. The runner chooses one
//! of `run`, `retry` or `rollback` from the instance's operation, spawns the
//! call on the tokio runtime and records the resulting handle in the
//! [`ExecutionRegistry`]. Handles are polled, never awaited blindly: the
//! running-subtask worker checks them for completion and for an exceeded
//! timeout on every cycle.
//!
//! A dispatch is registered before the instance is committed as RUNNING, so
//! no worker can observe a RUNNING row without its handle. The spawned body
//! waits on a [`PendingDispatch`] and only starts once the commit succeeded.
//!
//! Handles live in process memory only. After a restart the registry is
//! empty, and the workers treat a RUNNING or CANCELING instance without a
//! handle as lost.

use crate::config::RetryRollbackPolicy;
use crate::context::Context;
use crate::models::{SubtaskInstance, SubtaskOperation};
use crate::subtask::{CancellationToken, Subtask};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, OwnedSemaphorePermit};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Subtask method selected for a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    Run,
    Retry,
    Rollback,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::Retry => write!(f, "retry"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Pick the method for `operation`. Skip and cancel operations are never
/// dispatched.
pub fn select_invocation(
    operation: SubtaskOperation,
    prohibit_rollback: bool,
    policy: RetryRollbackPolicy,
) -> Option<Invocation> {
    match operation {
        SubtaskOperation::Execute => Some(Invocation::Run),
        SubtaskOperation::Retry => match policy {
            RetryRollbackPolicy::SkipWhenProhibited if prohibit_rollback => Some(Invocation::Run),
            _ => Some(Invocation::Retry),
        },
        SubtaskOperation::Rollback => Some(Invocation::Rollback),
        SubtaskOperation::Skip | SubtaskOperation::RollbackSkip | SubtaskOperation::Cancel => None,
    }
}

/// How a finished invocation ended
#[derive(Debug)]
pub enum ExecutionResult {
    Succeeded(Context),
    Failed(String),
}

/// One in-flight invocation
pub struct Execution {
    pub execution_id: Uuid,
    pub subtask_id: i64,
    pub invocation: Invocation,
    subtask: Arc<dyn Subtask>,
    handle: JoinHandle<anyhow::Result<Context>>,
    started_at: Instant,
    timeout: Duration,
    cancellation: CancellationToken,
    cancel_requested: AtomicBool,
}

impl Execution {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_timed_out(&self) -> bool {
        self.elapsed() > self.timeout
    }

    /// Forward a cancellation request for this invocation to the subtask, at
    /// most once
    pub fn request_cancel(&self) -> bool {
        if self.cancel_requested.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.subtask.cancel(&self.cancellation);
        true
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    /// Collect the outcome of a finished invocation
    pub async fn into_result(self) -> ExecutionResult {
        match self.handle.await {
            Ok(Ok(context)) => ExecutionResult::Succeeded(context),
            Ok(Err(e)) => ExecutionResult::Failed(format!("{e:#}")),
            Err(join_error) if join_error.is_panic() => {
                ExecutionResult::Failed("subtask panicked".to_string())
            }
            Err(join_error) => ExecutionResult::Failed(join_error.to_string()),
        }
    }

    /// Stop tracking an invocation that will not be collected. The spawned
    /// future keeps running until it returns on its own.
    pub fn abandon(self) {
        debug!(
            execution_id = %self.execution_id,
            subtask_id = self.subtask_id,
            "Abandoned execution handle"
        );
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("execution_id", &self.execution_id)
            .field("subtask_id", &self.subtask_id)
            .field("invocation", &self.invocation)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// In-flight invocations keyed by subtask id
#[derive(Debug, Default)]
pub struct ExecutionRegistry {
    executions: DashMap<i64, Execution>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, subtask_id: i64) -> bool {
        self.executions.contains_key(&subtask_id)
    }

    /// `None` when no handle is tracked for the subtask
    pub fn is_finished(&self, subtask_id: i64) -> Option<bool> {
        self.executions.get(&subtask_id).map(|e| e.is_finished())
    }

    pub fn is_timed_out(&self, subtask_id: i64) -> Option<bool> {
        self.executions.get(&subtask_id).map(|e| e.is_timed_out())
    }

    pub fn request_cancel(&self, subtask_id: i64) -> Option<bool> {
        self.executions.get(&subtask_id).map(|e| e.request_cancel())
    }

    pub fn take(&self, subtask_id: i64) -> Option<Execution> {
        self.executions.remove(&subtask_id).map(|(_, execution)| execution)
    }

    /// Remove one specific execution, leaving a newer one for the same
    /// subtask in place
    fn withdraw(&self, subtask_id: i64, execution_id: Uuid) -> Option<Execution> {
        self.executions
            .remove_if(&subtask_id, |_, execution| execution.execution_id == execution_id)
            .map(|(_, execution)| execution)
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    fn insert(&self, execution: Execution) {
        if let Some(previous) = self.executions.insert(execution.subtask_id, execution) {
            warn!(
                subtask_id = previous.subtask_id,
                execution_id = %previous.execution_id,
                "Replaced a tracked execution handle"
            );
        }
    }
}

/// Dispatches subtask invocations onto the runtime
#[derive(Debug, Clone)]
pub struct Runner {
    executions: Arc<ExecutionRegistry>,
    policy: RetryRollbackPolicy,
}

impl Runner {
    pub fn new(executions: Arc<ExecutionRegistry>, policy: RetryRollbackPolicy) -> Self {
        Self { executions, policy }
    }

    pub fn executions(&self) -> &Arc<ExecutionRegistry> {
        &self.executions
    }

    pub fn policy(&self) -> RetryRollbackPolicy {
        self.policy
    }

    /// Register and spawn the invocation selected by `instance.operation`.
    /// The body does not start until the returned [`PendingDispatch`] is
    /// released; `permit` is held until the body returns. Returns `None` for
    /// operations that are not dispatched.
    pub fn dispatch(
        &self,
        instance: &SubtaskInstance,
        subtask: Arc<dyn Subtask>,
        context: Context,
        permit: OwnedSemaphorePermit,
    ) -> Option<PendingDispatch> {
        let invocation =
            select_invocation(instance.operation, instance.prohibit_rollback, self.policy)?;
        let execution_id = Uuid::new_v4();
        let cancellation = CancellationToken::new();
        let (start_tx, start_rx) = oneshot::channel::<()>();

        let body = Arc::clone(&subtask);
        let token = cancellation.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            if start_rx.await.is_err() {
                anyhow::bail!("dispatch withdrawn before start");
            }
            match invocation {
                Invocation::Run => body.run(context, token).await,
                Invocation::Retry => body.retry(context, token).await,
                Invocation::Rollback => body.rollback(context, token).await,
            }
        });

        self.executions.insert(Execution {
            execution_id,
            subtask_id: instance.subtask_id,
            invocation,
            subtask,
            handle,
            started_at: Instant::now(),
            timeout: instance.timeout(),
            cancellation,
            cancel_requested: AtomicBool::new(false),
        });

        info!(
            task_id = instance.task_id,
            subtask_id = instance.subtask_id,
            subtask_name = %instance.name,
            execution_id = %execution_id,
            invocation = %invocation,
            run_count = instance.run_count,
            "Dispatched subtask"
        );

        Some(PendingDispatch {
            executions: Arc::clone(&self.executions),
            subtask_id: instance.subtask_id,
            execution_id,
            start: Some(start_tx),
        })
    }
}

/// A registered execution whose body is waiting to start. Dropping it
/// without [`release`](Self::release) withdraws the execution and the body
/// returns without running.
#[must_use = "the subtask body only runs once the dispatch is released"]
pub struct PendingDispatch {
    executions: Arc<ExecutionRegistry>,
    subtask_id: i64,
    execution_id: Uuid,
    start: Option<oneshot::Sender<()>>,
}

impl PendingDispatch {
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Let the body run
    pub fn release(mut self) {
        if let Some(start) = self.start.take() {
            // A closed receiver means the body already went away; the handle
            // reports that outcome.
            let _ = start.send(());
        }
    }
}

impl Drop for PendingDispatch {
    fn drop(&mut self) {
        if self.start.is_none() {
            return;
        }
        if let Some(execution) = self.executions.withdraw(self.subtask_id, self.execution_id) {
            warn!(
                subtask_id = self.subtask_id,
                execution_id = %self.execution_id,
                "Withdrew a dispatch that was never committed"
            );
            execution.abandon();
        }
    }
}

impl fmt::Debug for PendingDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingDispatch")
            .field("subtask_id", &self.subtask_id)
            .field("execution_id", &self.execution_id)
            .field("released", &self.start.is_none())
            .finish()
    }
}
