//! # Executor Pools
//!
//! Two disjoint, fixed-size sets of execution slots. Automatically scheduled
//! dispatches draw from the auto pool and operator-triggered ones from the
//! manual pool, so a saturated scheduler can never hold back an intervention.
//! A slot is held for the whole lifetime of the invocation it was acquired
//! for.

use crate::config::ExecutorConfig;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone)]
pub struct ExecutorPools {
    auto: Arc<Semaphore>,
    manual: Arc<Semaphore>,
    auto_size: usize,
    manual_size: usize,
}

impl ExecutorPools {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            auto: Arc::new(Semaphore::new(config.auto_pool_size)),
            manual: Arc::new(Semaphore::new(config.manual_pool_size)),
            auto_size: config.auto_pool_size,
            manual_size: config.manual_pool_size,
        }
    }

    /// Take a slot without waiting; `None` when the pool is exhausted or closed
    pub fn try_acquire(&self, manual: bool) -> Option<OwnedSemaphorePermit> {
        let pool = if manual { &self.manual } else { &self.auto };
        Arc::clone(pool).try_acquire_owned().ok()
    }

    pub fn available(&self, manual: bool) -> usize {
        if manual {
            self.manual.available_permits()
        } else {
            self.auto.available_permits()
        }
    }

    pub fn size(&self, manual: bool) -> usize {
        if manual {
            self.manual_size
        } else {
            self.auto_size
        }
    }

    /// Refuse every further acquisition
    pub fn close(&self) {
        self.auto.close();
        self.manual.close();
    }

    pub fn is_closed(&self) -> bool {
        self.auto.is_closed()
    }
}
