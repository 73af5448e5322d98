//! Resume strategy: compute where a stopped run should continue.
//!
//! The compute/execute split is deliberate: callers inspect and log the
//! intended plan before committing it, so an operator can see exactly what a
//! resume will do.

use serde::{Deserialize, Serialize};

use super::{Phase, RunState, RunStatus, TaskStatus};
use crate::errors::LifecycleError;

/// The safe continuation point for a non-active run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeStrategy {
    /// Phase to re-enter. Diagnose maps to implement.
    pub resume_phase: Phase,
    /// Component ids already completed - work that must not be redone.
    pub completed_components: Vec<String>,
    /// Most recently completed component id, empty if none.
    pub last_checkpoint: String,
    /// State fields the resume will clear.
    pub cleared_fields: Vec<String>,
}

/// Compute the resume plan for a stopped run.
///
/// Only valid when status is failed, paused, or budget_exceeded. Active and
/// completed runs have nothing to resume and fail with a descriptive error.
pub fn compute_resume_strategy(state: &RunState) -> Result<ResumeStrategy, LifecycleError> {
    match state.status {
        RunStatus::Active => {
            return Err(LifecycleError::AlreadyActive {
                id: state.id.clone(),
            });
        }
        RunStatus::Completed => {
            return Err(LifecycleError::AlreadyCompleted {
                id: state.id.clone(),
            });
        }
        RunStatus::Paused | RunStatus::Failed | RunStatus::BudgetExceeded => {}
    }

    let resume_phase = if state.phase == Phase::Diagnose {
        Phase::Implement
    } else {
        state.phase
    };

    let completed_components: Vec<String> = state
        .component_tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(|t| t.component_id.clone())
        .collect();

    let last_checkpoint = completed_components.last().cloned().unwrap_or_default();

    Ok(ResumeStrategy {
        resume_phase,
        completed_components,
        last_checkpoint,
        cleared_fields: vec!["pause_reason".to_string()],
    })
}

/// Apply a resume strategy: reactivate the run at the computed phase.
pub fn execute_resume(mut state: RunState, strategy: &ResumeStrategy) -> RunState {
    state.status = RunStatus::Active;
    state.phase = strategy.resume_phase;
    state.pause_reason.clear();
    state
}
