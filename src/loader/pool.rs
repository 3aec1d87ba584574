//! Bounded pool of blocking worker units on the tokio runtime.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::{CacheError, Result};

/// Runs worker units on the runtime's blocking threads.
///
/// Admission is capped at `capacity` units in flight; beyond that
/// [`try_spawn`](Self::try_spawn) fails fast instead of queueing. At most
/// `workers` admitted units run at once.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    handle: Handle,
    admission: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// Pool on an explicit runtime
    pub fn new(handle: Handle, workers: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            handle,
            admission: Arc::new(Semaphore::new(capacity)),
            workers: Arc::new(Semaphore::new(workers.max(1))),
            capacity,
        }
    }

    /// Pool on the runtime of the calling thread
    pub fn current(workers: usize, capacity: usize) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        Ok(Self::new(handle, workers, capacity))
    }

    /// Pool sized from `worker_threads` and `max_in_flight`
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::current(config.worker_threads, config.max_in_flight)
    }

    /// Admission capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Units admitted and not yet finished
    pub fn in_flight(&self) -> usize {
        self.capacity - self.admission.available_permits()
    }

    /// Admit and schedule `job`, or fail with [`CacheError::PoolExhausted`].
    pub fn try_spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let admitted = Arc::clone(&self.admission)
            .try_acquire_owned()
            .map_err(|_| CacheError::PoolExhausted {
                capacity: self.capacity,
            })?;
        let workers = Arc::clone(&self.workers);

        self.handle.spawn(async move {
            let _admitted = admitted;
            let Ok(_worker) = workers.acquire_owned().await else {
                return;
            };
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                tracing::warn!("Worker unit failed: {e}");
            }
        });
        Ok(())
    }
}
