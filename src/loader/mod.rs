//! Per-target asynchronous loading.
//!
//! Each display target has a slot holding a generation token. Starting a new
//! request or cancelling replaces the token with a fresh one from a single
//! controller-wide counter; a worker unit captures the token when it is
//! spawned and may only deliver if the token is still current. Stale results
//! are dropped without the sink ever hearing of them.

mod pool;
mod target;

pub use pool::WorkerPool;
pub use target::{TargetId, TargetState};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use target::TargetSlot;

use crate::cache::CacheKey;
use crate::config::Config;
use crate::coordinator::CacheCoordinator;
use crate::error::Result;
use crate::models::{ArtRequest, Bitmap, CallContext, CancelFlag};

/// Receives results for display targets.
///
/// Called with the controller's lock held: implementations must hand the
/// image off (e.g. over a channel) and not call back into the
/// [`LoadController`] synchronously.
pub trait ImageSink: Send + Sync {
    /// The latest request for `target` resolved.
    fn on_image_ready(&self, target: TargetId, key: &CacheKey, image: Bitmap, secondary: Option<Bitmap>);

    /// The latest request for `target` found nothing.
    fn on_image_failed(&self, _target: TargetId, _key: &CacheKey) {}
}

/// How [`LoadController::request`] handled a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Served from memory and delivered before returning
    MemoryHit,
    /// A worker unit was started
    Spawned,
    /// The same request is already running for this target
    Deduplicated,
}

type Targets = Arc<Mutex<HashMap<TargetId, TargetSlot>>>;

fn lock(targets: &Targets) -> MutexGuard<'_, HashMap<TargetId, TargetSlot>> {
    targets.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Dispatches requests for display targets to worker units.
pub struct LoadController {
    coordinator: Arc<CacheCoordinator>,
    pool: WorkerPool,
    sink: Arc<dyn ImageSink>,
    targets: Targets,
    generations: AtomicU64,
}

impl LoadController {
    /// Controller over an explicit pool
    pub fn new(coordinator: Arc<CacheCoordinator>, pool: WorkerPool, sink: Arc<dyn ImageSink>) -> Self {
        Self {
            coordinator,
            pool,
            sink,
            targets: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }

    /// Controller on the current tokio runtime, sized from `config`
    pub fn from_config(
        coordinator: Arc<CacheCoordinator>,
        config: &Config,
        sink: Arc<dyn ImageSink>,
    ) -> Result<Self> {
        Ok(Self::new(coordinator, WorkerPool::from_config(config)?, sink))
    }

    /// Coordinator shared with the worker units
    pub fn coordinator(&self) -> &Arc<CacheCoordinator> {
        &self.coordinator
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Show `request` on `target`.
    ///
    /// A memory hit is delivered before this returns. Otherwise a worker
    /// unit is started, replacing any unit still running for a different
    /// request on the same target. Fails with
    /// [`CacheError::PoolExhausted`](crate::error::CacheError::PoolExhausted)
    /// when no unit can be admitted; the target is then left as it was.
    pub fn request(&self, target: TargetId, request: ArtRequest) -> Result<RequestOutcome> {
        let mut targets = lock(&self.targets);
        let slot = targets.entry(target).or_default();

        if let Some((image, secondary)) = self.coordinator.memory_lookup_request(&request) {
            slot.supersede(self.next_generation());
            slot.state = TargetState::Delivered;
            self.sink.on_image_ready(target, &request.key, image, secondary);
            slot.request = Some(request);
            return Ok(RequestOutcome::MemoryHit);
        }

        if slot.is_pending_for(&request) {
            tracing::debug!("{target} already loading {}", request.key);
            return Ok(RequestOutcome::Deduplicated);
        }

        let generation = self.next_generation();
        let cancel = CancelFlag::new();
        let unit = WorkerUnit {
            target,
            generation,
            request: request.clone(),
            cancel: cancel.clone(),
            coordinator: Arc::clone(&self.coordinator),
            sink: Arc::clone(&self.sink),
            targets: Arc::clone(&self.targets),
        };
        self.pool.try_spawn(move || unit.run())?;

        slot.supersede(generation);
        slot.state = TargetState::Pending;
        slot.request = Some(request);
        slot.cancel = Some(cancel);
        Ok(RequestOutcome::Spawned)
    }

    /// Stop whatever is running for `target`; its result will be dropped.
    ///
    /// Returns whether a unit was pending. Unknown targets are left alone.
    pub fn cancel(&self, target: TargetId) -> bool {
        let mut targets = lock(&self.targets);
        let Some(slot) = targets.get_mut(&target) else {
            return false;
        };
        slot.supersede(self.next_generation());
        let was_pending = slot.state == TargetState::Pending;
        if was_pending {
            slot.state = TargetState::Cancelled;
        }
        was_pending
    }

    /// Cancel and forget `target`, e.g. when its view is destroyed.
    pub fn release(&self, target: TargetId) {
        if let Some(mut slot) = lock(&self.targets).remove(&target) {
            slot.supersede(self.next_generation());
        }
    }

    /// State of `target`
    pub fn state(&self, target: TargetId) -> TargetState {
        lock(&self.targets)
            .get(&target)
            .map_or(TargetState::Idle, |slot| slot.state)
    }

    /// Number of targets waiting on a worker unit
    pub fn pending(&self) -> usize {
        lock(&self.targets)
            .values()
            .filter(|slot| slot.state == TargetState::Pending)
            .count()
    }
}

impl std::fmt::Debug for LoadController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadController")
            .field("pool", &self.pool)
            .field("targets", &lock(&self.targets).len())
            .finish_non_exhaustive()
    }
}

/// One background resolution, bound to the generation it was spawned for
struct WorkerUnit {
    target: TargetId,
    generation: u64,
    request: ArtRequest,
    cancel: CancelFlag,
    coordinator: Arc<CacheCoordinator>,
    sink: Arc<dyn ImageSink>,
    targets: Targets,
}

impl WorkerUnit {
    fn run(self) {
        let result = if self.cancel.is_cancelled() {
            None
        } else {
            self.coordinator
                .resolve_variant(&self.request, &self.cancel, CallContext::Background)
        };

        let mut targets = lock(&self.targets);
        let Some(slot) = targets.get_mut(&self.target) else {
            return;
        };
        if slot.generation != self.generation {
            tracing::debug!("Dropping stale result for {} ({})", self.target, self.request.key);
            return;
        }
        slot.cancel = None;
        match result {
            Some((image, secondary)) => {
                slot.state = TargetState::Delivered;
                self.sink
                    .on_image_ready(self.target, &self.request.key, image, secondary);
            }
            None => {
                slot.state = TargetState::Failed;
                self.sink.on_image_failed(self.target, &self.request.key);
            }
        }
    }
}
