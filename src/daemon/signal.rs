//! Best-effort signalling into a running daemon.
//!
//! The FIFO is a fire-and-forget notification channel, not a delivery queue:
//! a missing FIFO, a plain file squatting on its path (corruption), or a
//! daemon that is not reading all fail silently with `false`. Writers never
//! block waiting for a reader.

use std::fs;
use std::io::Write;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::Path;
use tracing::debug;

use super::directive::Directive;
use crate::project::ProjectManager;

/// Health snapshot for a project's daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonHealth {
    /// True iff a pid was read and the OS confirms the process exists.
    pub alive: bool,
    pub pid: Option<i32>,
    pub fifo_exists: bool,
}

/// Write one line to the project's FIFO. Returns whether the write happened.
pub fn send_signal(project_dir: &Path, message: &str) -> bool {
    let fifo_path = ProjectManager::new(project_dir).fifo_path();

    let Ok(meta) = fs::metadata(&fifo_path) else {
        return false;
    };
    if !meta.file_type().is_fifo() {
        // Plain file at the FIFO path is corruption, not a channel
        return false;
    }

    // O_NONBLOCK so a write with no attached reader fails with ENXIO instead
    // of hanging forever.
    let opened = fs::OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(&fifo_path);

    match opened {
        Ok(mut file) => writeln!(file, "{message}").is_ok(),
        Err(e) => {
            debug!("FIFO write to {} failed: {}", fifo_path.display(), e);
            false
        }
    }
}

/// Serialize a directive to its wire form and send it.
pub fn send_directive(project_dir: &Path, directive: &Directive) -> bool {
    send_signal(project_dir, &directive.to_wire())
}

/// Probe the daemon for a project: FIFO presence and pid liveness.
///
/// A stale pid file pointing at a dead process reports `alive: false`
/// without raising.
pub fn check_daemon_health(project_dir: &Path) -> DaemonHealth {
    let project = ProjectManager::new(project_dir);

    let fifo_exists = fs::metadata(project.fifo_path())
        .map(|m| m.file_type().is_fifo())
        .unwrap_or(false);

    let pid = fs::read_to_string(project.pid_path())
        .ok()
        .and_then(|s| s.trim().parse::<i32>().ok());

    let alive = pid.map(process_exists).unwrap_or(false);

    DaemonHealth {
        alive,
        pid,
        fifo_exists,
    }
}

/// Signal 0 is a pure existence check - no signal is delivered.
fn process_exists(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_send_signal_no_fifo_returns_false() {
        let dir = tempdir().unwrap();
        assert!(!send_signal(dir.path(), "resume"));
    }

    #[test]
    fn test_send_signal_regular_file_returns_false() {
        let dir = tempdir().unwrap();
        let project = ProjectManager::new(dir.path());
        project.init().unwrap();
        fs::write(project.fifo_path(), "not a fifo").unwrap();

        assert!(!send_signal(dir.path(), "resume"));
    }

    #[test]
    fn test_send_signal_fifo_without_reader_returns_false() {
        let dir = tempdir().unwrap();
        let project = ProjectManager::new(dir.path());
        project.init().unwrap();
        super::super::ensure_fifo(&project.fifo_path()).unwrap();

        // FIFO exists but nothing has it open for reading
        assert!(!send_signal(dir.path(), "resume"));
    }

    #[test]
    fn test_send_directive_no_fifo_returns_false() {
        let dir = tempdir().unwrap();
        let mut directive = Directive::new("set_mode");
        directive
            .payload
            .insert("mode".into(), serde_json::json!("unary"));
        assert!(!send_directive(dir.path(), &directive));
    }

    #[test]
    fn test_health_empty_project() {
        let dir = tempdir().unwrap();
        let health = check_daemon_health(dir.path());
        assert_eq!(
            health,
            DaemonHealth {
                alive: false,
                pid: None,
                fifo_exists: false
            }
        );
    }

    #[test]
    fn test_health_own_pid_is_alive() {
        let dir = tempdir().unwrap();
        let project = ProjectManager::new(dir.path());
        project.init().unwrap();
        fs::write(project.pid_path(), std::process::id().to_string()).unwrap();

        let health = check_daemon_health(dir.path());
        assert!(health.alive);
        assert_eq!(health.pid, Some(std::process::id() as i32));
    }

    #[test]
    fn test_health_stale_pid_reports_dead() {
        let dir = tempdir().unwrap();
        let project = ProjectManager::new(dir.path());
        project.init().unwrap();
        // Max pid on Linux is bounded well below this
        fs::write(project.pid_path(), "999999999").unwrap();

        let health = check_daemon_health(dir.path());
        assert!(!health.alive);
        assert_eq!(health.pid, Some(999_999_999));
    }

    #[test]
    fn test_health_garbage_pid_file() {
        let dir = tempdir().unwrap();
        let project = ProjectManager::new(dir.path());
        project.init().unwrap();
        fs::write(project.pid_path(), "not-a-pid").unwrap();

        let health = check_daemon_health(dir.path());
        assert!(!health.alive);
        assert_eq!(health.pid, None);
    }

    #[test]
    fn test_health_reports_fifo_presence() {
        let dir = tempdir().unwrap();
        let project = ProjectManager::new(dir.path());
        project.init().unwrap();
        super::super::ensure_fifo(&project.fifo_path()).unwrap();

        let health = check_daemon_health(dir.path());
        assert!(health.fifo_exists);
        assert!(!health.alive);
    }
}
