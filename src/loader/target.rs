//! Per-target bookkeeping.

use std::fmt;

use crate::models::{ArtRequest, CancelFlag};

/// Host-chosen id of a view that displays artwork
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// Where a target is in its load cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetState {
    /// Nothing requested yet
    #[default]
    Idle,
    /// A worker unit is running for the latest request
    Pending,
    /// The latest request was delivered
    Delivered,
    /// The latest request found nothing
    Failed,
    /// The latest request was cancelled
    Cancelled,
}

#[derive(Debug, Default)]
pub(crate) struct TargetSlot {
    /// Replaced on every new request and cancellation with a token from the
    /// controller's counter; a unit may only deliver while the token it
    /// captured is still current. Tokens are never reused, even across
    /// `release`.
    pub(crate) generation: u64,
    pub(crate) state: TargetState,
    pub(crate) request: Option<ArtRequest>,
    pub(crate) cancel: Option<CancelFlag>,
}

impl TargetSlot {
    /// Invalidate whatever unit is running for this target and move to
    /// `generation`.
    pub(crate) fn supersede(&mut self, generation: u64) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.generation = generation;
    }

    pub(crate) fn is_pending_for(&self, request: &ArtRequest) -> bool {
        self.state == TargetState::Pending
            && self
                .request
                .as_ref()
                .is_some_and(|current| current.same_target_result(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supersede_cancels_running_unit() {
        let cancel = CancelFlag::new();
        let mut slot = TargetSlot {
            cancel: Some(cancel.clone()),
            ..TargetSlot::default()
        };
        slot.supersede(41);
        assert!(cancel.is_cancelled());
        assert!(slot.cancel.is_none());
        assert_eq!(slot.generation, 41);
    }

    #[test]
    fn test_pending_match_ignores_other_variants() {
        let request = ArtRequest::album("Air", "Talkie Walkie");
        let slot = TargetSlot {
            state: TargetState::Pending,
            request: Some(request.clone()),
            ..TargetSlot::default()
        };
        assert!(slot.is_pending_for(&request));
        assert!(!slot.is_pending_for(&request.clone().with_blur()));
        assert!(!slot.is_pending_for(&ArtRequest::album("Air", "Moon Safari")));
    }
}
