//! Render phase state machine.
//!
//! ```text
//! Idle --begin_deferred--> DeferredGeometry --end_deferred--> Idle (g-buffer resolved)
//! Idle --begin_forward---> Forward ---------end_forward----> Idle
//! ```
//!
//! Out-of-order calls are programming errors and panic at the caller.

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Phase {
    Idle,
    DeferredGeometry,
    Forward,
}

#[derive(Debug, Clone)]
pub struct PhaseTracker {
    phase: Phase,
    gbuffer_resolved: bool,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            gbuffer_resolved: false,
        }
    }
}

impl PhaseTracker {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether a deferred pass completed since the last invalidation.
    pub fn gbuffer_resolved(&self) -> bool {
        self.gbuffer_resolved
    }

    #[track_caller]
    pub fn begin_deferred(&mut self) {
        self.expect_idle("begin_deferred_state");
        self.phase = Phase::DeferredGeometry;
        self.gbuffer_resolved = false;
    }

    #[track_caller]
    pub fn end_deferred(&mut self) {
        assert!(
            self.phase == Phase::DeferredGeometry,
            "end_deferred_state called in {:?}; begin_deferred_state must come first",
            self.phase
        );
        self.phase = Phase::Idle;
        self.gbuffer_resolved = true;
    }

    #[track_caller]
    pub fn check_lighting(&self) {
        self.expect_idle("apply_lighting_phase");
        assert!(
            self.gbuffer_resolved,
            "apply_lighting_phase called before a completed deferred pass"
        );
    }

    #[track_caller]
    pub fn begin_forward(&mut self) {
        self.expect_idle("begin_forward_state");
        self.phase = Phase::Forward;
    }

    #[track_caller]
    pub fn end_forward(&mut self) {
        assert!(
            self.phase == Phase::Forward,
            "end_forward_state called in {:?}; begin_forward_state must come first",
            self.phase
        );
        self.phase = Phase::Idle;
    }

    /// Marks the g-buffer contents as stale (after reallocation).
    #[track_caller]
    pub fn invalidate(&mut self, operation: &str) {
        self.expect_idle(operation);
        self.gbuffer_resolved = false;
    }

    #[track_caller]
    pub fn expect_idle(&self, operation: &str) {
        assert!(
            self.phase == Phase::Idle,
            "{operation} requires the idle phase, renderer is in {:?}",
            self.phase
        );
    }
}
