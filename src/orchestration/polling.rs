//! # Polling Loops
//!
//! Both coordinators are pure polling control loops. Each worker runs on its
//! own fixed-delay timer: wait `initial_delay`, then repeatedly run one cycle
//! and sleep `poll_interval` after it finishes. Cycles are isolated twice
//! over. A failed or panicking cycle is logged and the loop carries on, and
//! inside a cycle every polled item is processed through [`process_isolated`]
//! so one task or subtask cannot abort the scan of the others.

use crate::error::{Result, TaskEngineError};
use crate::metrics::MetricsSink;
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result of processing one polled item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// State was changed
    Processed,
    /// Nothing to do for this item in this cycle
    Skipped,
}

/// Per-cycle item counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

#[async_trait]
pub trait PollingWorker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one cycle over every item the worker is responsible for
    async fn poll(&self) -> Result<CycleReport>;
}

/// Process one polled item, converting errors and panics into a failed count
pub async fn process_isolated<F>(worker: &str, item_id: i64, report: &mut CycleReport, item: F)
where
    F: Future<Output = Result<ItemOutcome>>,
{
    match AssertUnwindSafe(item).catch_unwind().await {
        Ok(Ok(ItemOutcome::Processed)) => report.processed += 1,
        Ok(Ok(ItemOutcome::Skipped)) => report.skipped += 1,
        Ok(Err(e)) => {
            report.failed += 1;
            error!(worker, item_id, error = %e, "Failed to process polled item");
        }
        Err(_) => {
            report.failed += 1;
            error!(worker, item_id, "Panic while processing polled item");
        }
    }
}

/// Run a single cycle of `worker` and record its duration
pub async fn run_cycle(worker: &dyn PollingWorker, metrics: &dyn MetricsSink) -> Option<CycleReport> {
    let name = worker.name();
    let start = Instant::now();
    let result = AssertUnwindSafe(worker.poll()).catch_unwind().await;
    let elapsed = start.elapsed();
    metrics.record_duration(name, elapsed);

    match result {
        Ok(Ok(report)) => {
            if report.total() > 0 {
                debug!(
                    worker = name,
                    processed = report.processed,
                    skipped = report.skipped,
                    failed = report.failed,
                    duration_ms = elapsed.as_millis() as u64,
                    "Worker cycle completed"
                );
            }
            Some(report)
        }
        Ok(Err(e)) => {
            error!(worker = name, error = %e, "Worker cycle failed");
            None
        }
        Err(_) => {
            error!(worker = name, "Worker cycle panicked");
            None
        }
    }
}

/// Shared running flag and shutdown signal for a group of loops
#[derive(Debug, Default)]
pub struct LoopControl {
    running: AtomicBool,
    shutdown_notify: Notify,
}

impl LoopControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns false if the group was already running
    pub fn start(&self) -> bool {
        !self.running.swap(true, Ordering::AcqRel)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.shutdown_notify.notify_waiters();
    }

    /// Sleep for `duration`; returns false if shutdown was signalled first
    async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.shutdown_notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent stop() is not missed
        notified.as_mut().enable();

        if !self.is_running() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_running(),
            _ = &mut notified => false,
        }
    }
}

/// Fixed-delay loop driving one worker
pub struct PollingLoop {
    worker: Arc<dyn PollingWorker>,
    control: Arc<LoopControl>,
    metrics: Arc<dyn MetricsSink>,
    initial_delay: Duration,
    poll_interval: Duration,
}

impl PollingLoop {
    pub fn new(
        worker: Arc<dyn PollingWorker>,
        control: Arc<LoopControl>,
        metrics: Arc<dyn MetricsSink>,
        initial_delay: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            worker,
            control,
            metrics,
            initial_delay,
            poll_interval,
        }
    }

    /// Run until the control is stopped
    pub async fn run(self) {
        let name = self.worker.name();
        info!(
            worker = name,
            initial_delay_ms = self.initial_delay.as_millis() as u64,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Starting polling loop"
        );

        if self.control.sleep(self.initial_delay).await {
            loop {
                run_cycle(self.worker.as_ref(), self.metrics.as_ref()).await;

                if !self.control.sleep(self.poll_interval).await {
                    debug!(worker = name, "Shutdown notification received");
                    break;
                }
            }
        }

        info!(worker = name, "Polling loop ended");
    }
}

/// The loops of one coordinator, started and stopped together
pub struct WorkerGroup {
    label: &'static str,
    workers: Vec<Arc<dyn PollingWorker>>,
    control: Arc<LoopControl>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerGroup {
    pub fn new(label: &'static str, workers: Vec<Arc<dyn PollingWorker>>) -> Self {
        Self {
            label,
            workers,
            control: Arc::new(LoopControl::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn worker_names(&self) -> Vec<&'static str> {
        self.workers.iter().map(|w| w.name()).collect()
    }

    /// Spawn one loop per worker. Must be called inside a tokio runtime.
    pub fn start(
        &self,
        metrics: &Arc<dyn MetricsSink>,
        initial_delay: Duration,
        poll_interval: Duration,
    ) -> Result<()> {
        if !self.control.start() {
            return Err(TaskEngineError::Internal(format!(
                "{} is already running",
                self.label
            )));
        }

        let mut handles = self.handles.lock();
        for worker in &self.workers {
            let polling = PollingLoop::new(
                worker.clone(),
                self.control.clone(),
                metrics.clone(),
                initial_delay,
                poll_interval,
            );
            handles.push(tokio::spawn(polling.run()));
        }

        info!(
            coordinator = self.label,
            workers = ?self.worker_names(),
            "🚀 Coordinator started"
        );
        Ok(())
    }

    /// Signal every loop and wait up to `timeout` for them to exit. Loops
    /// still running after that are aborted.
    pub async fn stop(&self, timeout: Duration) {
        if !self.control.is_running() {
            debug!(coordinator = self.label, "Coordinator already stopped");
        }
        self.control.stop();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        let deadline = Instant::now() + timeout;
        for mut handle in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, &mut handle).await.is_err() {
                warn!(coordinator = self.label, "Polling loop did not stop in time; aborting");
                handle.abort();
            }
        }

        info!(coordinator = self.label, "🛑 Coordinator stopped");
    }

    /// Run exactly one cycle of every worker, in order
    pub async fn tick(&self, metrics: &dyn MetricsSink) -> Vec<Option<CycleReport>> {
        let mut reports = Vec::with_capacity(self.workers.len());
        for worker in &self.workers {
            reports.push(run_cycle(worker.as_ref(), metrics).await);
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recorder {
        samples: Mutex<Vec<String>>,
    }

    impl MetricsSink for Recorder {
        fn record_duration(&self, name: &str, _duration: Duration) {
            self.samples.lock().push(name.to_string());
        }
    }

    struct Counting {
        cycles: AtomicUsize,
    }

    #[async_trait]
    impl PollingWorker for Counting {
        fn name(&self) -> &'static str {
            "counting_worker"
        }

        async fn poll(&self) -> Result<CycleReport> {
            let cycle = self.cycles.fetch_add(1, Ordering::SeqCst);
            if cycle == 0 {
                return Err(TaskEngineError::DatabaseError("connection reset".to_string()));
            }
            let mut report = CycleReport::default();
            process_isolated(self.name(), 1, &mut report, async { Ok(ItemOutcome::Processed) }).await;
            process_isolated(self.name(), 2, &mut report, async {
                Err(TaskEngineError::TaskNotFound(2))
            })
            .await;
            Ok(report)
        }
    }

    #[tokio::test]
    async fn test_item_panics_are_contained() {
        let mut report = CycleReport::default();
        let explode = true;
        process_isolated("test", 1, &mut report, async move {
            if explode {
                panic!("subtask blew up");
            }
            Ok(ItemOutcome::Processed)
        })
        .await;
        process_isolated("test", 2, &mut report, async { Ok(ItemOutcome::Skipped) }).await;

        assert_eq!(
            report,
            CycleReport {
                processed: 0,
                skipped: 1,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn test_loop_survives_failed_cycle_and_stops() {
        let worker = Arc::new(Counting {
            cycles: AtomicUsize::new(0),
        });
        let control = Arc::new(LoopControl::new());
        let metrics = Arc::new(Recorder::default());
        assert!(control.start());
        assert!(!control.start());

        let polling = PollingLoop::new(
            worker.clone(),
            control.clone(),
            metrics.clone(),
            Duration::ZERO,
            Duration::from_millis(5),
        );
        let handle = tokio::spawn(polling.run());

        tokio::time::sleep(Duration::from_millis(60)).await;
        control.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(worker.cycles.load(Ordering::SeqCst) >= 2);
        assert!(metrics.samples.lock().iter().all(|n| n == "counting_worker"));
    }

    #[tokio::test]
    async fn test_worker_group_rejects_double_start() {
        let worker: Arc<dyn PollingWorker> = Arc::new(Counting {
            cycles: AtomicUsize::new(1),
        });
        let metrics: Arc<dyn MetricsSink> = Arc::new(Recorder::default());
        let group = WorkerGroup::new("test_coordinator", vec![worker]);

        group
            .start(&metrics, Duration::from_secs(60), Duration::from_secs(1))
            .unwrap();
        assert!(group.is_running());
        assert!(matches!(
            group.start(&metrics, Duration::ZERO, Duration::ZERO),
            Err(TaskEngineError::Internal(_))
        ));

        group.stop(Duration::from_secs(1)).await;
        assert!(!group.is_running());

        let reports = group.tick(metrics.as_ref()).await;
        assert_eq!(
            reports,
            vec![Some(CycleReport {
                processed: 1,
                skipped: 0,
                failed: 1
            })]
        );
    }
}
