//! Run lifecycle state machine.
//!
//! One `RunState` per project run. Status transitions are driven by external
//! events and validated here:
//!
//! ```text
//! active → paused          (operator intervention needed, budget warning)
//! active → failed          (unrecoverable error)
//! active → completed       (all components pass)
//! active → budget_exceeded (dollar cap hit)
//! paused → active          (resume)
//! ```
//!
//! Phase order is fixed: interview → shape → decompose → contract →
//! implement → integrate → complete. The diagnose phase sits outside the
//! list and always re-enters implement.

pub mod replay;
pub mod resume;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::LifecycleError;

/// Pipeline phase a run is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Interview,
    Shape,
    Decompose,
    Contract,
    Implement,
    Integrate,
    Complete,
    Diagnose,
}

/// Phases in forward order. Diagnose is deliberately absent - it always
/// re-enters implement rather than advancing.
pub const PHASE_ORDER: [Phase; 7] = [
    Phase::Interview,
    Phase::Shape,
    Phase::Decompose,
    Phase::Contract,
    Phase::Implement,
    Phase::Integrate,
    Phase::Complete,
];

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Interview => "interview",
            Phase::Shape => "shape",
            Phase::Decompose => "decompose",
            Phase::Contract => "contract",
            Phase::Implement => "implement",
            Phase::Integrate => "integrate",
            Phase::Complete => "complete",
            Phase::Diagnose => "diagnose",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Paused,
    Failed,
    Completed,
    BudgetExceeded,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Active => "active",
            RunStatus::Paused => "paused",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::BudgetExceeded => "budget_exceeded",
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Failed | RunStatus::Completed | RunStatus::BudgetExceeded
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a single component through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

/// Tracks a single component's build outcome under a run.
///
/// Tasks are created when a component enters the pipeline and mutated by
/// build/integration results. They are never deleted, only superseded by a
/// new run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentTask {
    pub component_id: String,
    pub status: TaskStatus,
}

impl ComponentTask {
    pub fn new(component_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            component_id: component_id.into(),
            status,
        }
    }
}

/// Mutable lifecycle state for one project run.
///
/// This struct is persisted as `state.json` in the control directory, but the
/// persisted file is a cache: the audit log is ground truth and
/// [`replay::rebuild_state_from_audit`] can reconstruct this from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub id: String,
    pub project_dir: String,
    pub status: RunStatus,
    pub phase: Phase,
    #[serde(default)]
    pub component_tasks: Vec<ComponentTask>,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub completed_at: String,
    #[serde(default)]
    pub pause_reason: String,
}

impl RunState {
    /// Record token usage and its dollar cost against this run.
    pub fn record_tokens(&mut self, input_tokens: u64, output_tokens: u64, cost: f64) {
        self.total_tokens += input_tokens + output_tokens;
        self.total_cost_usd += cost;
    }

    /// Validate and apply a status transition.
    ///
    /// Only the edges documented in the module header are legal. Anything
    /// else returns [`LifecycleError::IllegalTransition`] and leaves the
    /// state untouched - callers must not silently coerce.
    pub fn transition(&mut self, to: RunStatus) -> Result<(), LifecycleError> {
        let legal = match (self.status, to) {
            (RunStatus::Active, RunStatus::Paused)
            | (RunStatus::Active, RunStatus::Failed)
            | (RunStatus::Active, RunStatus::Completed)
            | (RunStatus::Active, RunStatus::BudgetExceeded)
            | (RunStatus::Paused, RunStatus::Active) => true,
            _ => false,
        };
        if !legal {
            return Err(LifecycleError::IllegalTransition {
                from: self.status.as_str(),
                to: to.as_str(),
            });
        }
        self.status = to;
        Ok(())
    }

    /// Pause the run, recording why.
    pub fn pause(&mut self, reason: impl Into<String>) -> Result<(), LifecycleError> {
        self.transition(RunStatus::Paused)?;
        self.pause_reason = reason.into();
        Ok(())
    }

    /// Fail the run terminally.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), LifecycleError> {
        self.transition(RunStatus::Failed)?;
        self.pause_reason = reason.into();
        self.completed_at = Utc::now().to_rfc3339();
        Ok(())
    }

    /// Mark the run completed.
    pub fn complete(&mut self) -> Result<(), LifecycleError> {
        self.transition(RunStatus::Completed)?;
        self.completed_at = Utc::now().to_rfc3339();
        Ok(())
    }

    /// Terminate the run because a hard budget cap was hit.
    pub fn exceed_budget(&mut self, reason: impl Into<String>) -> Result<(), LifecycleError> {
        self.transition(RunStatus::BudgetExceeded)?;
        self.pause_reason = reason.into();
        self.completed_at = Utc::now().to_rfc3339();
        Ok(())
    }

    /// Upsert a component task by id.
    pub fn upsert_task(&mut self, component_id: &str, status: TaskStatus) {
        match self
            .component_tasks
            .iter_mut()
            .find(|t| t.component_id == component_id)
        {
            Some(task) => task.status = status,
            None => self
                .component_tasks
                .push(ComponentTask::new(component_id, status)),
        }
    }
}

/// Create a fresh RunState for a project.
pub fn create_run(project_dir: impl Into<String>) -> RunState {
    let id: String = Uuid::new_v4().simple().to_string()[..12].to_string();
    RunState {
        id,
        project_dir: project_dir.into(),
        status: RunStatus::Active,
        phase: Phase::Interview,
        component_tasks: Vec::new(),
        total_cost_usd: 0.0,
        total_tokens: 0,
        created_at: Utc::now().to_rfc3339(),
        completed_at: String::new(),
        pause_reason: String::new(),
    }
}

/// Advance to the next phase in the fixed order. Returns the new phase.
///
/// Diagnose (and any future out-of-list phase) resets to implement; advancing
/// from complete is a no-op.
pub fn advance_phase(state: &mut RunState) -> Phase {
    let Some(idx) = PHASE_ORDER.iter().position(|p| *p == state.phase) else {
        state.phase = Phase::Implement;
        return state.phase;
    };
    if idx < PHASE_ORDER.len() - 1 {
        state.phase = PHASE_ORDER[idx + 1];
    }
    state.phase
}

/// Format a run state as a human-readable summary block.
pub fn format_run_summary(state: &RunState) -> String {
    let mut lines = vec![
        format!(
            "[{}] {:15} ${:.4}",
            state.id,
            state.status.as_str(),
            state.total_cost_usd
        ),
        format!("  Phase: {}", state.phase),
        format!("  Project: {}", state.project_dir),
    ];
    if !state.component_tasks.is_empty() {
        let completed = state
            .component_tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let failed = state
            .component_tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count();
        lines.push(format!(
            "  Components: {}/{} done, {} failed",
            completed,
            state.component_tasks.len(),
            failed
        ));
    }
    if !state.pause_reason.is_empty() {
        lines.push(format!("  Reason: {}", state.pause_reason));
    }
    lines.join("\n")
}
