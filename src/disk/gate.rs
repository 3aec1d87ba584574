//! Pause gate for disk reads.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::models::CallContext;

#[derive(Debug, Default)]
struct GateState {
    paused: bool,
    closed: bool,
}

/// Boolean guarded by a condition variable.
///
/// Background callers wait while the gate is paused; foreground callers are
/// turned away instead. Closing the gate releases every waiter for good.
#[derive(Debug, Default)]
pub struct PauseGate {
    state: Mutex<GateState>,
    resumed: Condvar,
}

impl PauseGate {
    /// Create an open, unpaused gate
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pause or resume. Resuming wakes every waiter.
    pub fn set_paused(&self, paused: bool) {
        let mut state = self.lock();
        state.paused = paused;
        if !paused {
            self.resumed.notify_all();
        }
    }

    /// Whether the gate is paused
    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Release all waiters permanently.
    pub fn close(&self) {
        self.lock().closed = true;
        self.resumed.notify_all();
    }

    /// Wait until the gate lets the caller through.
    ///
    /// Returns `false` when a foreground caller hits a paused gate or the gate
    /// has been closed; the caller should treat that as a miss.
    pub fn pass(&self, ctx: CallContext) -> bool {
        let state = self.lock();
        if state.closed {
            return false;
        }
        if !state.paused {
            return true;
        }
        if ctx == CallContext::Foreground {
            return false;
        }
        let state = self
            .resumed
            .wait_while(state, |s| s.paused && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        !state.closed
    }
}
