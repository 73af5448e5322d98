//! Integration tests for anvil.
//!
//! Exercises the CLI surface end-to-end plus the crash-recovery flow
//! (audit log → replay → resume) through the public library API.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

use anvil::audit::actions;
use anvil::lifecycle::replay::{ReplayOptions, compute_audit_delta, rebuild_state_from_audit};
use anvil::lifecycle::resume::{compute_resume_strategy, execute_resume};
use anvil::lifecycle::{Phase, RunStatus, TaskStatus, create_run};
use anvil::project::ProjectManager;

fn anvil() -> Command {
    cargo_bin_cmd!("anvil")
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        anvil().arg("--help").assert().success();
    }

    #[test]
    fn test_version() {
        anvil().arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_control_dir() {
        let dir = create_temp_project();
        anvil()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized control directory"));

        assert!(dir.path().join(".anvil").is_dir());
        assert!(dir.path().join(".anvil/config.yaml").is_file());
    }

    #[test]
    fn test_status_without_run() {
        let dir = create_temp_project();
        anvil()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("No run found"));
    }

    #[test]
    fn test_health_without_daemon() {
        let dir = create_temp_project();
        anvil()
            .current_dir(dir.path())
            .arg("health")
            .assert()
            .success()
            .stdout(predicate::str::contains("not running"));
    }

    #[test]
    fn test_signal_without_daemon_fails() {
        let dir = create_temp_project();
        anvil()
            .current_dir(dir.path())
            .args(["signal", "resume"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("could not deliver signal"));
    }

    #[test]
    fn test_stop_without_daemon_writes_sentinel() {
        let dir = create_temp_project();
        anvil()
            .current_dir(dir.path())
            .arg("stop")
            .assert()
            .success()
            .stdout(predicate::str::contains("Shutdown sentinel written"));
        assert!(dir.path().join(".anvil/shutdown").exists());
    }
}

mod status_and_recovery {
    use super::*;

    #[test]
    fn test_status_shows_persisted_run() {
        let dir = create_temp_project();
        let project = ProjectManager::new(dir.path());
        let mut state = create_run(dir.path().to_string_lossy().as_ref());
        state.phase = Phase::Implement;
        state.upsert_task("auth", TaskStatus::Completed);
        project.save_state(&state).unwrap();

        anvil()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Phase: implement"))
            .stdout(predicate::str::contains("1/1 done"));
    }

    #[test]
    fn test_status_verify_consistent() {
        let dir = create_temp_project();
        let project = ProjectManager::new(dir.path());
        let audit = project.audit_log();
        project.init().unwrap();
        audit.append(actions::INTERVIEW, "5 questions").unwrap();
        audit.append(actions::BUILD, "auth: 3/3 passed").unwrap();

        let entries = audit.load().unwrap();
        let state = rebuild_state_from_audit(
            &entries,
            dir.path().to_string_lossy().as_ref(),
            &ReplayOptions::default(),
        );
        project.save_state(&state).unwrap();

        anvil()
            .current_dir(dir.path())
            .args(["status", "--verify"])
            .assert()
            .success()
            .stdout(predicate::str::contains("State matches audit log"));
    }

    #[test]
    fn test_status_verify_detects_divergence() {
        let dir = create_temp_project();
        let project = ProjectManager::new(dir.path());
        project.init().unwrap();
        project
            .audit_log()
            .append(actions::INTERVIEW, "5 questions")
            .unwrap();

        // Snapshot claims interview phase but the log says it finished
        let state = create_run(dir.path().to_string_lossy().as_ref());
        project.save_state(&state).unwrap();

        anvil()
            .current_dir(dir.path())
            .args(["status", "--verify"])
            .assert()
            .success()
            .stdout(predicate::str::contains("diverges"))
            .stdout(predicate::str::contains("Phase mismatch"));
    }

    #[test]
    fn test_recover_rebuilds_state_from_audit() {
        let dir = create_temp_project();
        let project = ProjectManager::new(dir.path());
        project.init().unwrap();
        let audit = project.audit_log();
        audit.append(actions::INTERVIEW, "4 questions").unwrap();
        audit.append(actions::BUILD, "auth: 5/5 passed").unwrap();
        audit.append(actions::BUILD, "db: 1/4 passed").unwrap();

        // No state.json exists: simulates a crash before the first snapshot
        anvil()
            .current_dir(dir.path())
            .arg("recover")
            .assert()
            .success()
            .stdout(predicate::str::contains("Rebuilt state from 3 audit entries"));

        let state = ProjectManager::new(dir.path()).load_state().unwrap().unwrap();
        assert_eq!(state.phase, Phase::Decompose);
        assert_eq!(state.component_tasks.len(), 2);
        assert_eq!(state.component_tasks[0].status, TaskStatus::Completed);
        assert_eq!(state.component_tasks[1].status, TaskStatus::Failed);
    }

    #[test]
    fn test_recover_respects_shaping_config() {
        let dir = create_temp_project();
        let project = ProjectManager::new(dir.path());
        project.init().unwrap();
        fs::write(project.config_path(), "shaping: true\n").unwrap();
        project
            .audit_log()
            .append(actions::INTERVIEW, "4 questions")
            .unwrap();

        anvil().current_dir(dir.path()).arg("recover").assert().success();

        let state = project.load_state().unwrap().unwrap();
        assert_eq!(state.phase, Phase::Shape);
    }

    #[test]
    fn test_recover_empty_audit_fails() {
        let dir = create_temp_project();
        anvil()
            .current_dir(dir.path())
            .arg("recover")
            .assert()
            .failure()
            .stderr(predicate::str::contains("audit log is empty"));
    }
}

mod resume_flow {
    use super::*;

    #[test]
    fn test_resume_command_reactivates_paused_run() {
        let dir = create_temp_project();
        let project = ProjectManager::new(dir.path());
        let mut state = create_run(dir.path().to_string_lossy().as_ref());
        state.phase = Phase::Implement;
        state.upsert_task("auth", TaskStatus::Completed);
        state.pause("budget warning").unwrap();
        project.save_state(&state).unwrap();

        anvil()
            .current_dir(dir.path())
            .arg("resume")
            .assert()
            .success()
            .stdout(predicate::str::contains("Resuming at phase implement"));

        let resumed = project.load_state().unwrap().unwrap();
        assert_eq!(resumed.status, RunStatus::Active);
        assert!(resumed.pause_reason.is_empty());

        let entries = project.audit_log().load().unwrap();
        assert!(entries.iter().any(|e| e.action == actions::RESUME));
    }

    #[test]
    fn test_resume_command_refuses_active_run() {
        let dir = create_temp_project();
        let project = ProjectManager::new(dir.path());
        project
            .save_state(&create_run(dir.path().to_string_lossy().as_ref()))
            .unwrap();

        anvil()
            .current_dir(dir.path())
            .arg("resume")
            .assert()
            .failure()
            .stderr(predicate::str::contains("already active"));
    }

    #[test]
    fn test_crash_replay_then_resume_round_trip() {
        // Full recovery path: log events, crash, rebuild, pause, resume.
        let dir = create_temp_project();
        let project = ProjectManager::new(dir.path());
        project.init().unwrap();
        let audit = project.audit_log();
        audit.append(actions::INTERVIEW, "6 questions").unwrap();
        audit.append(actions::BUILD, "core: 8/8 passed").unwrap();
        audit.append(actions::SYSTEMIC_FAILURE, "api outage").unwrap();

        let entries = audit.load().unwrap();
        let state = rebuild_state_from_audit(
            &entries,
            dir.path().to_string_lossy().as_ref(),
            &ReplayOptions::default(),
        );
        assert_eq!(state.status, RunStatus::Paused);

        let strategy = compute_resume_strategy(&state).unwrap();
        assert_eq!(strategy.completed_components, vec!["core"]);
        let resumed = execute_resume(state, &strategy);
        assert_eq!(resumed.status, RunStatus::Active);

        // Rebuilt-and-resumed state is consistent with the log modulo the
        // resume itself
        project.save_state(&resumed).unwrap();
        let delta = compute_audit_delta(&resumed, &entries, &ReplayOptions::default());
        assert_eq!(delta.len(), 1);
        assert!(delta[0].contains("Status mismatch"));
    }
}
