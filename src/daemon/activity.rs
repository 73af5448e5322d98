//! Activity tracking for stall detection.
//!
//! The daemon's periodic check loop uses this to notice runs that have gone
//! quiet (no API call or phase transition within the idle threshold). This is
//! advisory telemetry - it never drives the state machine.

use std::time::Instant;

/// What kind of activity was last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Init,
    ApiCall,
    StateTransition,
    AuditEntry,
    FifoSignal,
    PhaseComplete,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Init => "init",
            ActivityKind::ApiCall => "api_call",
            ActivityKind::StateTransition => "state_transition",
            ActivityKind::AuditEntry => "audit_entry",
            ActivityKind::FifoSignal => "fifo_signal",
            ActivityKind::PhaseComplete => "phase_complete",
        }
    }
}

/// Records the monotonic instant of the most recent activity.
#[derive(Debug)]
pub struct ActivityTracker {
    last_activity: Instant,
    kind: ActivityKind,
    #[cfg(test)]
    test_skew: std::time::Duration,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            last_activity: Instant::now(),
            kind: ActivityKind::Init,
            #[cfg(test)]
            test_skew: std::time::Duration::ZERO,
        }
    }

    /// Reset the idle timer. Called on API calls, state transitions, audit
    /// entries, FIFO signals, and phase completions.
    pub fn record(&mut self, kind: ActivityKind) {
        self.last_activity = Instant::now();
        self.kind = kind;
        #[cfg(test)]
        {
            self.test_skew = std::time::Duration::ZERO;
        }
    }

    /// Seconds since the last recorded activity.
    pub fn idle_seconds(&self) -> f64 {
        let elapsed = self.last_activity.elapsed();
        #[cfg(test)]
        let elapsed = elapsed + self.test_skew;
        elapsed.as_secs_f64()
    }

    /// True only when nothing has happened for `threshold_secs`.
    pub fn is_idle(&self, threshold_secs: u64) -> bool {
        self.idle_seconds() >= threshold_secs as f64
    }

    pub fn last_activity_kind(&self) -> ActivityKind {
        self.kind
    }

    #[cfg(test)]
    fn backdate(&mut self, secs: u64) {
        self.test_skew += std::time::Duration::from_secs(secs);
    }
}
