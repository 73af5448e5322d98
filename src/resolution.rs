//! Competitive resolution - score and pick winners from parallel attempts.
//!
//! When competitive implementation is enabled, N workers implement the same
//! component independently. The orchestrator joins on all of them before this
//! module runs, so resolution is a pure function over a completed, immutable
//! result set.
//!
//! Resolution policy:
//! 1. Test pass rate (primary - more passing tests wins)
//! 2. Build duration (tiebreaker - longer build favored as more thorough)
//! 3. Losing implementations retained as read-only reference material

use serde::{Deserialize, Serialize};

/// Aggregated test run results, as reported by the external test-execution
/// collaborator. Only the counts are consumed here; the raw runner output
/// format is not our concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
}

impl TestResults {
    pub fn new(passed: u32, total: u32) -> Self {
        Self {
            total,
            passed,
            failed: total.saturating_sub(passed),
            errors: 0,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.failed == 0 && self.errors == 0
    }
}

/// A scored competitive attempt for a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredAttempt {
    pub attempt_id: String,
    pub component_id: String,
    pub test_results: TestResults,
    pub build_duration_seconds: f64,
    /// Where the attempt's sources live - losers keep theirs for diagnosis.
    pub src_dir: String,
}

impl ScoredAttempt {
    /// Fraction of tests passed. Zero when no tests ran, which both avoids
    /// division by zero and ranks "no tests" as worst.
    pub fn pass_rate(&self) -> f64 {
        if self.test_results.total == 0 {
            return 0.0;
        }
        f64::from(self.test_results.passed) / f64::from(self.test_results.total)
    }

    /// (pass_rate, duration) - higher is better for both.
    fn score_tuple(&self) -> (f64, f64) {
        (self.pass_rate(), self.build_duration_seconds)
    }
}

/// Select the best attempt. Highest pass rate wins; longest build breaks
/// ties. Returns `None` when no attempts were provided.
pub fn select_winner(attempts: &[ScoredAttempt]) -> Option<&ScoredAttempt> {
    attempts.iter().max_by(|a, b| {
        a.score_tuple()
            .partial_cmp(&b.score_tuple())
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

/// Format a human-readable summary of the resolution outcome.
pub fn format_resolution_summary(winner: &ScoredAttempt, losers: &[&ScoredAttempt]) -> String {
    let mut lines = vec![format!(
        "Winner: {} ({}/{} tests, {:.1}s)",
        winner.attempt_id,
        winner.test_results.passed,
        winner.test_results.total,
        winner.build_duration_seconds
    )];
    for loser in losers {
        lines.push(format!(
            "  Lost: {} ({}/{} tests, {:.1}s)",
            loser.attempt_id,
            loser.test_results.passed,
            loser.test_results.total,
            loser.build_duration_seconds
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(id: &str, passed: u32, total: u32, duration: f64) -> ScoredAttempt {
        ScoredAttempt {
            attempt_id: id.into(),
            component_id: "comp".into(),
            test_results: TestResults::new(passed, total),
            build_duration_seconds: duration,
            src_dir: format!("/tmp/attempts/{id}"),
        }
    }

    #[test]
    fn test_highest_pass_rate_wins() {
        let attempts = [attempt("slow", 3, 5, 10.0), attempt("clean", 5, 5, 4.0)];
        let winner = select_winner(&attempts).unwrap();
        assert_eq!(winner.attempt_id, "clean");
    }

    #[test]
    fn test_tie_broken_by_longer_build() {
        let attempts = [attempt("fast", 4, 5, 10.0), attempt("thorough", 4, 5, 20.0)];
        let winner = select_winner(&attempts).unwrap();
        assert_eq!(winner.attempt_id, "thorough");
    }

    #[test]
    fn test_empty_attempts_no_winner() {
        assert!(select_winner(&[]).is_none());
    }

    #[test]
    fn test_single_attempt_wins() {
        let attempts = [attempt("only", 0, 3, 1.0)];
        assert_eq!(select_winner(&attempts).unwrap().attempt_id, "only");
    }

    #[test]
    fn test_zero_total_ranks_worst() {
        let attempts = [attempt("no_tests", 0, 0, 100.0), attempt("some", 1, 5, 1.0)];
        let winner = select_winner(&attempts).unwrap();
        assert_eq!(winner.attempt_id, "some");
    }

    #[test]
    fn test_pass_rate_zero_total_is_zero() {
        assert_eq!(attempt("x", 0, 0, 1.0).pass_rate(), 0.0);
        assert_eq!(attempt("y", 5, 5, 1.0).pass_rate(), 1.0);
    }

    #[test]
    fn test_all_passed_requires_nonzero_total() {
        assert!(!TestResults::new(0, 0).all_passed());
        assert!(TestResults::new(3, 3).all_passed());
        assert!(!TestResults::new(2, 3).all_passed());
    }

    #[test]
    fn test_resolution_summary_lists_winner_and_losers() {
        let attempts = [attempt("a", 5, 5, 8.0), attempt("b", 2, 5, 3.0)];
        let winner = select_winner(&attempts).unwrap();
        let losers: Vec<&ScoredAttempt> = attempts
            .iter()
            .filter(|a| a.attempt_id != winner.attempt_id)
            .collect();

        let summary = format_resolution_summary(winner, &losers);
        assert!(summary.contains("Winner: a (5/5 tests, 8.0s)"));
        assert!(summary.contains("Lost: b (2/5 tests, 3.0s)"));
    }
}
