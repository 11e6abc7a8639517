//! Lifecycle phase of one managed resource

use serde::{Deserialize, Serialize};

/// Phase of a resource as seen by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourcePhase {
    /// No identity assigned yet, or deleted
    Absent,
    /// Base create issued, post-create steps running
    Creating,
    /// Confirmed by a read
    Present,
    /// Update plan running
    Updating,
    /// Delete flow running
    Deleting,
    /// Written but not yet observable; a later read can reconcile it
    NotFoundAfterWrite,
}

impl ResourcePhase {
    /// Whether the reconciler may move from `self` to `next`
    pub fn can_transition_to(self, next: ResourcePhase) -> bool {
        use ResourcePhase::*;
        matches!(
            (self, next),
            (Absent, Creating)
                | (Creating, Present)
                | (Creating, NotFoundAfterWrite)
                | (Present, Updating)
                | (Present, Deleting)
                | (Present, Absent)
                | (Updating, Present)
                | (Updating, NotFoundAfterWrite)
                | (NotFoundAfterWrite, Present)
                | (NotFoundAfterWrite, Absent)
                | (NotFoundAfterWrite, Deleting)
                | (Deleting, Absent)
        )
    }

    /// Whether an identity is held in this phase
    pub fn has_identity(self) -> bool {
        !matches!(self, ResourcePhase::Absent)
    }
}

impl std::fmt::Display for ResourcePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourcePhase::Absent => write!(f, "absent"),
            ResourcePhase::Creating => write!(f, "creating"),
            ResourcePhase::Present => write!(f, "present"),
            ResourcePhase::Updating => write!(f, "updating"),
            ResourcePhase::Deleting => write!(f, "deleting"),
            ResourcePhase::NotFoundAfterWrite => write!(f, "not_found_after_write"),
        }
    }
}

/// Phase tracker that logs every transition
#[derive(Debug)]
pub struct PhaseTracker {
    kind: &'static str,
    phase: ResourcePhase,
}

impl PhaseTracker {
    pub fn new(kind: &'static str, phase: ResourcePhase) -> Self {
        Self { kind, phase }
    }

    pub fn phase(&self) -> ResourcePhase {
        self.phase
    }

    /// Move to `next`; an unexpected transition is logged and still applied
    pub fn advance(&mut self, next: ResourcePhase) {
        if self.phase == next {
            return;
        }
        if !self.phase.can_transition_to(next) {
            tracing::warn!(
                kind = self.kind,
                from = %self.phase,
                to = %next,
                "Unexpected phase transition"
            );
        }
        tracing::debug!(kind = self.kind, from = %self.phase, to = %next, "Phase transition");
        self.phase = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_path() {
        assert!(ResourcePhase::Absent.can_transition_to(ResourcePhase::Creating));
        assert!(ResourcePhase::Creating.can_transition_to(ResourcePhase::Present));
        assert!(ResourcePhase::Creating.can_transition_to(ResourcePhase::NotFoundAfterWrite));
        assert!(!ResourcePhase::Absent.can_transition_to(ResourcePhase::Updating));
    }

    #[test]
    fn test_not_found_after_write_can_recover() {
        assert!(ResourcePhase::NotFoundAfterWrite.can_transition_to(ResourcePhase::Present));
        assert!(ResourcePhase::NotFoundAfterWrite.has_identity());
    }

    #[test]
    fn test_tracker_follows_transitions() {
        let mut tracker = PhaseTracker::new("project", ResourcePhase::Present);
        tracker.advance(ResourcePhase::Deleting);
        tracker.advance(ResourcePhase::Absent);
        assert_eq!(tracker.phase(), ResourcePhase::Absent);
    }

    #[test]
    fn test_phase_serde() {
        let json = serde_json::to_string(&ResourcePhase::NotFoundAfterWrite).unwrap();
        assert_eq!(json, "\"not_found_after_write\"");
    }
}
