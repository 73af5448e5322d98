//! Per-project control directory layout and persistence.
//!
//! Every orchestrated project gets a `.anvil/` directory holding the run
//! state snapshot, the append-only audit log, the dispatch FIFO, the daemon
//! pid file, and the shutdown sentinel. All paths are derived here so the
//! rest of the crate never hard-codes file names.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audit::AuditLog;
use crate::lifecycle::RunState;

/// Name of the control directory inside a project.
pub const CONTROL_DIR: &str = ".anvil";

/// Resolves and manages the control directory for one project.
#[derive(Debug, Clone)]
pub struct ProjectManager {
    project_dir: PathBuf,
}

impl ProjectManager {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn control_dir(&self) -> PathBuf {
        self.project_dir.join(CONTROL_DIR)
    }

    /// Create the control directory if it does not exist yet. Idempotent.
    pub fn init(&self) -> Result<()> {
        let dir = self.control_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create control dir {}", dir.display()))?;
        Ok(())
    }

    /// The dispatch FIFO operators write directives into.
    pub fn fifo_path(&self) -> PathBuf {
        self.control_dir().join("dispatch")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.control_dir().join("daemon.pid")
    }

    /// Sentinel file whose presence asks the daemon to exit.
    pub fn shutdown_path(&self) -> PathBuf {
        self.control_dir().join("shutdown")
    }

    pub fn state_path(&self) -> PathBuf {
        self.control_dir().join("state.json")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.control_dir().join("audit.jsonl")
    }

    pub fn config_path(&self) -> PathBuf {
        self.control_dir().join("config.yaml")
    }

    /// The project's audit log handle.
    pub fn audit_log(&self) -> AuditLog {
        AuditLog::new(self.audit_path())
    }

    /// Persist the run state snapshot. The snapshot is a convenience cache;
    /// the audit log remains the source of truth for recovery.
    pub fn save_state(&self, state: &RunState) -> Result<()> {
        self.init()?;
        let path = self.state_path();
        let json = serde_json::to_string_pretty(state).context("failed to serialize run state")?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write state to {}", path.display()))?;
        Ok(())
    }

    /// Load the run state snapshot, or `None` when no run has been started.
    pub fn load_state(&self) -> Result<Option<RunState>> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("failed to read state from {}", path.display()))?;
        let state = serde_json::from_str(&json)
            .with_context(|| format!("corrupt state file at {}", path.display()))?;
        Ok(Some(state))
    }

    /// Ask a running daemon to exit at its next loop iteration.
    pub fn request_shutdown(&self) -> Result<()> {
        self.init()?;
        fs::write(self.shutdown_path(), b"").context("failed to write shutdown sentinel")?;
        Ok(())
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_path().exists()
    }

    pub fn clear_shutdown(&self) {
        let _ = fs::remove_file(self.shutdown_path());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{create_run, Phase, RunStatus};
    use tempfile::tempdir;

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempdir().unwrap();
        let project = ProjectManager::new(dir.path());
        project.init().unwrap();
        project.init().unwrap();
        assert!(project.control_dir().is_dir());
    }

    #[test]
    fn test_paths_live_under_control_dir() {
        let project = ProjectManager::new("/work/myproj");
        for path in [
            project.fifo_path(),
            project.pid_path(),
            project.shutdown_path(),
            project.state_path(),
            project.audit_path(),
            project.config_path(),
        ] {
            assert!(path.starts_with("/work/myproj/.anvil"));
        }
    }

    #[test]
    fn test_state_round_trip() {
        let dir = tempdir().unwrap();
        let project = ProjectManager::new(dir.path());

        let mut state = create_run(dir.path().to_string_lossy().as_ref());
        state.phase = Phase::Implement;
        state.record_tokens(800, 400, 0.35);
        project.save_state(&state).unwrap();

        let loaded = project.load_state().unwrap().unwrap();
        assert_eq!(loaded.id, state.id);
        assert_eq!(loaded.phase, Phase::Implement);
        assert_eq!(loaded.status, RunStatus::Active);
        assert_eq!(loaded.total_tokens, 1200);
    }

    #[test]
    fn test_load_state_missing_returns_none() {
        let dir = tempdir().unwrap();
        let project = ProjectManager::new(dir.path());
        assert!(project.load_state().unwrap().is_none());
    }

    #[test]
    fn test_load_state_corrupt_errors() {
        let dir = tempdir().unwrap();
        let project = ProjectManager::new(dir.path());
        project.init().unwrap();
        fs::write(project.state_path(), "{broken").unwrap();
        assert!(project.load_state().is_err());
    }

    #[test]
    fn test_shutdown_sentinel_lifecycle() {
        let dir = tempdir().unwrap();
        let project = ProjectManager::new(dir.path());
        assert!(!project.shutdown_requested());

        project.request_shutdown().unwrap();
        assert!(project.shutdown_requested());

        project.clear_shutdown();
        assert!(!project.shutdown_requested());
    }
}
