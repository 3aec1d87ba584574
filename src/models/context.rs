//! Calling context and cooperative cancellation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Who is calling into a blocking tier.
///
/// Foreground callers (the thread driving the UI) must never wait on the
/// disk pause gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallContext {
    /// Interactive thread, never blocks
    Foreground,
    /// Worker unit, may block while the disk tier is paused
    #[default]
    Background,
}

/// Shared flag checked by worker units between pipeline stages
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a flag that is not yet cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
