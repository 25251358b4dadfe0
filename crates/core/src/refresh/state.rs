use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefreshPhase {
    Idle,
    Fetching,
    Scoring,
    Persisting,
    Failed,
}

impl RefreshPhase {
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            RefreshPhase::Fetching | RefreshPhase::Scoring | RefreshPhase::Persisting
        )
    }

    /// Legal edges of the per-cycle state machine.
    pub fn can_transition_to(self, next: RefreshPhase) -> bool {
        use RefreshPhase::*;
        matches!(
            (self, next),
            (Idle, Fetching)
                | (Fetching, Scoring)
                | (Fetching, Failed)
                | (Scoring, Persisting)
                | (Persisting, Idle)
                | (Persisting, Failed)
                | (Failed, Idle)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastSuccess {
    pub generation_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub asset_count: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastFailure {
    pub kind: &'static str,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Observable orchestrator state, served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshStatus {
    pub phase: RefreshPhase,
    pub cycle_started_at: Option<DateTime<Utc>>,
    pub last_success: Option<LastSuccess>,
    pub last_failure: Option<LastFailure>,
    pub completed_cycles: u64,
    pub failed_cycles: u64,
}

impl Default for RefreshStatus {
    fn default() -> Self {
        Self {
            phase: RefreshPhase::Idle,
            cycle_started_at: None,
            last_success: None,
            last_failure: None,
            completed_cycles: 0,
            failed_cycles: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_and_failure_edges_are_legal() {
        use RefreshPhase::*;
        let path = [Idle, Fetching, Scoring, Persisting, Idle];
        for w in path.windows(2) {
            assert!(w[0].can_transition_to(w[1]), "{:?} -> {:?}", w[0], w[1]);
        }
        assert!(Fetching.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Scoring));
        assert!(!Scoring.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Fetching));
    }

    #[test]
    fn only_in_flight_phases_are_busy() {
        assert!(!RefreshPhase::Idle.is_busy());
        assert!(RefreshPhase::Scoring.is_busy());
        assert!(!RefreshPhase::Failed.is_busy());
    }
}
