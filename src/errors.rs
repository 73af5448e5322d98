//! Typed error hierarchy for the anvil orchestrator.
//!
//! Two enums cover the two subsystems that must fail loudly:
//! - `LifecycleError` - illegal state-machine transitions and resume misuse
//! - `BackendError` - language-model collaborator failures
//!
//! Everything else (graph validation, directive parsing, FIFO sends) degrades
//! to error lists or boolean outcomes by design and never raises.

use thiserror::Error;

/// Errors from the run lifecycle state machine.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Run {id} is already active - nothing to resume")]
    AlreadyActive { id: String },

    #[error("Run {id} is already completed - nothing to resume")]
    AlreadyCompleted { id: String },
}

/// Errors from the language-model backend seam.
///
/// Budget exhaustion is distinct from transient API errors: the latter gets a
/// small bounded retry, the former is never retried.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Unknown backend: {name}")]
    UnknownBackend { name: String },
}

impl BackendError {
    /// Whether a bounded retry is worth attempting.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Api(_))
    }
}
