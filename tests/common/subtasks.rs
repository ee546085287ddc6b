//! Scriptable subtask implementations

use async_trait::async_trait;
use ob_task_engine::{CancellationToken, Context, Subtask};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Ordered record of invocations across all subtasks of a test
#[derive(Debug, Default, Clone)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }
}

/// Subtask whose behaviour is configured by the test.
///
/// Journal entries are `start:<name>[:<split>]`, `end:<name>[:<split>]` and
/// `rollback:<name>[:<split>]`, where `<split>` is the value of `split_key`
/// in the invocation context.
pub struct ScriptedSubtask {
    name: String,
    journal: Journal,
    timeout_seconds: u64,
    retry_count: u32,
    prohibit_rollback: bool,
    split_key: Option<String>,
    delay: Duration,
    failures_left: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    block_until_canceled: bool,
}

impl ScriptedSubtask {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            timeout_seconds: 30,
            retry_count: 0,
            prohibit_rollback: false,
            split_key: None,
            delay: Duration::from_millis(2),
            failures_left: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            block_until_canceled: false,
        }
    }

    pub fn failing(mut self, times: usize) -> Self {
        self.failures_left = AtomicUsize::new(times);
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn prohibiting_rollback(mut self) -> Self {
        self.prohibit_rollback = true;
        self
    }

    /// Journal the element of this split key with every entry
    pub fn split_on(mut self, key: &str) -> Self {
        self.split_key = Some(key.to_string());
        self
    }

    /// Run until the invocation is canceled
    pub fn blocking(mut self) -> Self {
        self.block_until_canceled = true;
        self
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn label(&self, context: &Context) -> String {
        match self.split_key.as_deref().and_then(|key| context.get(key)) {
            Some(element) => format!("{}:{}", self.name, element),
            None => self.name.clone(),
        }
    }
}

#[async_trait]
impl Subtask for ScriptedSubtask {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    fn retry_count(&self) -> u32 {
        self.retry_count
    }

    fn prohibit_rollback(&self) -> bool {
        self.prohibit_rollback
    }

    async fn run(&self, context: Context, cancel: CancellationToken) -> anyhow::Result<Context> {
        let label = self.label(&context);
        self.journal.push(format!("start:{label}"));
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {}
            _ = cancel.cancelled() => {}
        }
        if self.block_until_canceled {
            cancel.cancelled().await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if cancel.is_cancelled() {
            anyhow::bail!("{label} interrupted");
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            self.journal.push(format!("fail:{label}"));
            anyhow::bail!("{label} failed");
        }

        self.journal.push(format!("end:{label}"));
        Ok(context.with(format!("{label}.done"), "true"))
    }

    async fn rollback(&self, context: Context, _cancel: CancellationToken) -> anyhow::Result<Context> {
        self.journal.push(format!("rollback:{}", self.label(&context)));
        Ok(context)
    }
}
