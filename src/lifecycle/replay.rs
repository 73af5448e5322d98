//! Event sourcing: rebuild run state from the audit log.
//!
//! [`rebuild_state_from_audit`] is the authoritative recovery path after a
//! crash. It is a pure, deterministic fold over the total-ordered entry list:
//! replaying the same log twice yields identical output, which is what makes
//! recovery safe to retry. [`compute_audit_delta`] uses the same fold as a
//! consistency self-check against persisted state - it reports drift, it
//! never auto-corrects.

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use super::{Phase, RunState, RunStatus, TaskStatus, create_run};
use crate::audit::{AuditEntry, actions};

// Matches build detail of the form "<component_id>: <passed>/<total> passed"
static BUILD_DETAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\S+):\s*(\d+)/(\d+)\s+passed").unwrap());

/// Configuration the replay cannot infer from log content.
///
/// Whether an `interview` entry advances to shape or straight to decompose
/// depends on the project's shaping toggle, so it is an explicit input here
/// rather than guessed from surrounding entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOptions {
    pub shaping_enabled: bool,
}

/// Replay audit entries from an empty run state.
///
/// Replay rules:
/// - `interview` advances past interview (to shape when shaping is enabled,
///   else to decompose)
/// - `shape` and `shape_error` both advance to decompose - shaping is
///   best-effort, so errors still count as phase completion
/// - `build` with detail `"<id>: <passed>/<total> passed"` upserts a
///   component task: completed iff passed == total and total > 0
/// - `systemic_failure` pauses the run
/// - unknown actions are ignored
pub fn rebuild_state_from_audit(
    entries: &[AuditEntry],
    project_dir: &str,
    options: &ReplayOptions,
) -> RunState {
    let mut state = create_run(project_dir);

    for entry in entries {
        apply_entry(&mut state, entry, options);
    }
    state
}

fn apply_entry(state: &mut RunState, entry: &AuditEntry, options: &ReplayOptions) {
    match entry.action.as_str() {
        actions::INTERVIEW => {
            if state.phase == Phase::Interview {
                state.phase = if options.shaping_enabled {
                    Phase::Shape
                } else {
                    Phase::Decompose
                };
            }
        }
        actions::SHAPE | actions::SHAPE_ERROR => {
            if matches!(state.phase, Phase::Interview | Phase::Shape) {
                state.phase = Phase::Decompose;
            }
        }
        actions::BUILD => match parse_build_detail(&entry.detail) {
            Some((component_id, passed, total)) => {
                let status = if passed == total && total > 0 {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                };
                state.upsert_task(&component_id, status);
            }
            None => warn!("Unparseable build detail in audit log: {:?}", entry.detail),
        },
        actions::SYSTEMIC_FAILURE => {
            state.status = RunStatus::Paused;
            state.pause_reason = entry.detail.clone();
        }
        _ => {}
    }
}

/// Parse `"<component_id>: <passed>/<total> passed"` into its parts.
pub fn parse_build_detail(detail: &str) -> Option<(String, u32, u32)> {
    let caps = BUILD_DETAIL_REGEX.captures(detail)?;
    let component_id = caps.get(1)?.as_str().to_string();
    let passed = caps.get(2)?.as_str().parse().ok()?;
    let total = caps.get(3)?.as_str().parse().ok()?;
    Some((component_id, passed, total))
}

/// Replay the entries and diff the result against the given state.
///
/// Returns human-readable discrepancy strings when the persisted state and
/// the log-derived state disagree. Empty means consistent. Callers decide
/// whether to trust the log or the cache - this function only reports.
pub fn compute_audit_delta(
    state: &RunState,
    entries: &[AuditEntry],
    options: &ReplayOptions,
) -> Vec<String> {
    let replayed = rebuild_state_from_audit(entries, &state.project_dir, options);
    let mut delta = Vec::new();

    if replayed.phase != state.phase {
        delta.push(format!(
            "Phase mismatch: state has '{}' but audit replay yields '{}'",
            state.phase, replayed.phase
        ));
    }
    if replayed.status != state.status {
        delta.push(format!(
            "Status mismatch: state has '{}' but audit replay yields '{}'",
            state.status, replayed.status
        ));
    }
    for task in &replayed.component_tasks {
        match state
            .component_tasks
            .iter()
            .find(|t| t.component_id == task.component_id)
        {
            None => delta.push(format!(
                "Component '{}' present in audit replay but missing from state",
                task.component_id
            )),
            Some(existing) if existing.status != task.status => delta.push(format!(
                "Component '{}' status mismatch: state has '{:?}' but audit replay yields '{:?}'",
                task.component_id, existing.status, task.status
            )),
            Some(_) => {}
        }
    }
    // Reverse direction: the cache claiming work the log never recorded is
    // the suspicious kind of drift.
    for task in &state.component_tasks {
        if !replayed
            .component_tasks
            .iter()
            .any(|t| t.component_id == task.component_id)
        {
            delta.push(format!(
                "Component '{}' present in state but missing from audit replay",
                task.component_id
            ));
        }
    }
    delta
}
