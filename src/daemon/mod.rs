//! Background daemon: owns the dispatch loop for one project.
//!
//! The daemon is the only writer of run state. It alternates between driving
//! the current phase through a [`PhaseRunner`] and listening on the dispatch
//! FIFO for operator directives. Shutdown is cooperative: either a `shutdown`
//! directive or the sentinel file ends the loop at the next iteration.

pub mod activity;
pub mod directive;
pub mod signal;

pub use activity::{ActivityKind, ActivityTracker};
pub use directive::{Directive, parse_directive};
pub use signal::{DaemonHealth, check_daemon_health, send_directive, send_signal};

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::ffi::CString;
use std::fs;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::audit::actions;
use crate::config::AnvilConfig;
use crate::lifecycle::resume::{compute_resume_strategy, execute_resume};
use crate::lifecycle::{RunState, RunStatus};
use crate::project::ProjectManager;

/// Granularity of the FIFO poll loop. Bounds how late a shutdown sentinel
/// can be noticed.
const POLL_SLICE_MS: i32 = 250;

/// Drives one phase iteration of a run. The daemon owns the loop; the runner
/// owns what a phase actually does (backend calls, test execution).
#[async_trait]
pub trait PhaseRunner: Send {
    /// Execute one unit of work for the run's current phase, mutating the
    /// state in place (advancing phase, recording tasks and spend).
    async fn run_once(&mut self, state: &mut RunState) -> Result<()>;
}

/// Create the dispatch FIFO if missing. Idempotent; a non-FIFO file at the
/// path is corruption from a previous crash and gets replaced.
pub fn ensure_fifo(path: &Path) -> Result<()> {
    if let Ok(meta) = fs::metadata(path) {
        if meta.file_type().is_fifo() {
            return Ok(());
        }
        warn!("replacing non-FIFO file at {}", path.display());
        fs::remove_file(path)
            .with_context(|| format!("failed to remove stale file at {}", path.display()))?;
    }
    let cpath =
        CString::new(path.as_os_str().as_bytes()).context("FIFO path contains a NUL byte")?;
    let rc = unsafe { libc::mkfifo(cpath.as_ptr(), 0o600) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("mkfifo failed for {}", path.display()));
    }
    Ok(())
}

/// Line-oriented non-blocking reader over the dispatch FIFO.
struct FifoReader {
    fd: RawFd,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
}

impl FifoReader {
    /// Open read-write: holding our own write end means poll waits for data
    /// instead of reporting EOF every time the last writer detaches.
    fn open(path: &Path) -> Result<Self> {
        let cpath =
            CString::new(path.as_os_str().as_bytes()).context("FIFO path contains a NUL byte")?;
        let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR | libc::O_NONBLOCK) };
        if fd < 0 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("failed to open FIFO {}", path.display()));
        }
        Ok(Self {
            fd,
            buffer: Vec::new(),
            pending: VecDeque::new(),
        })
    }

    /// Return the next complete line, waiting up to `timeout_ms` for data.
    fn next_line(&mut self, timeout_ms: i32) -> Option<String> {
        if let Some(line) = self.pending.pop_front() {
            return Some(line);
        }

        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ready <= 0 || pfd.revents & libc::POLLIN == 0 {
            return None;
        }

        let mut chunk = [0u8; 4096];
        let n = unsafe { libc::read(self.fd, chunk.as_mut_ptr() as *mut libc::c_void, chunk.len()) };
        if n <= 0 {
            return None;
        }
        self.buffer.extend_from_slice(&chunk[..n as usize]);

        // Drain complete lines; a partial tail stays buffered for next read
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..pos]).trim().to_string();
            if !text.is_empty() {
                self.pending.push_back(text);
            }
        }
        self.pending.pop_front()
    }
}

impl Drop for FifoReader {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// The per-project dispatch daemon.
pub struct Daemon {
    project: ProjectManager,
    config: AnvilConfig,
    activity: ActivityTracker,
}

impl Daemon {
    pub fn new(project_dir: impl Into<std::path::PathBuf>, config: AnvilConfig) -> Self {
        Self {
            project: ProjectManager::new(project_dir.into()),
            config,
            activity: ActivityTracker::new(),
        }
    }

    pub fn project(&self) -> &ProjectManager {
        &self.project
    }

    /// Run the dispatch loop until shutdown is requested.
    pub async fn run<R: PhaseRunner>(&mut self, runner: &mut R) -> Result<()> {
        self.project.init()?;
        self.project.clear_shutdown();
        ensure_fifo(&self.project.fifo_path())?;
        fs::write(self.project.pid_path(), std::process::id().to_string())
            .context("failed to write pid file")?;
        let mut reader = FifoReader::open(&self.project.fifo_path())?;
        let audit = self.project.audit_log();
        info!(
            "daemon started for {} (pid {})",
            self.project.project_dir().display(),
            std::process::id()
        );

        loop {
            if self.project.shutdown_requested() {
                audit.append(actions::DAEMON_SHUTDOWN, "shutdown sentinel")?;
                break;
            }

            self.drive_phase(runner).await?;

            match self.wait_for_directive(&mut reader) {
                Some(directive) => {
                    self.activity.record(ActivityKind::FifoSignal);
                    audit.append(actions::DAEMON_DISPATCH, &directive.to_wire())?;
                    if !self.handle_directive(&directive)? {
                        audit.append(actions::DAEMON_SHUTDOWN, "shutdown directive")?;
                        break;
                    }
                }
                None => {
                    if self.activity.is_idle(self.config.max_idle_secs) {
                        warn!(
                            "run idle for {:.0}s (last activity: {})",
                            self.activity.idle_seconds(),
                            self.activity.last_activity_kind().as_str()
                        );
                    }
                }
            }
        }

        self.cleanup();
        info!("daemon stopped");
        Ok(())
    }

    /// Run one phase iteration when the run is active, bounded by the idle
    /// threshold so a wedged runner cannot stall the dispatch loop forever.
    async fn drive_phase<R: PhaseRunner>(&mut self, runner: &mut R) -> Result<()> {
        let Some(mut state) = self.project.load_state()? else {
            return Ok(());
        };
        if state.status != RunStatus::Active {
            return Ok(());
        }

        let budget = Duration::from_secs(self.config.max_idle_secs.max(1));
        match tokio::time::timeout(budget, runner.run_once(&mut state)).await {
            Ok(Ok(())) => {
                self.activity.record(ActivityKind::PhaseComplete);
            }
            Ok(Err(e)) => {
                warn!("phase runner error: {e:#}");
                if let Err(te) = state.pause(format!("phase error: {e}")) {
                    warn!("could not pause run after error: {te}");
                }
            }
            Err(_) => {
                warn!("phase runner exceeded {}s", budget.as_secs());
                if let Err(te) = state.pause("phase timed out") {
                    warn!("could not pause run after timeout: {te}");
                }
            }
        }
        self.project.save_state(&state)?;
        Ok(())
    }

    /// Block up to one health-check interval waiting for a directive,
    /// checking the shutdown sentinel between poll slices.
    fn wait_for_directive(&self, reader: &mut FifoReader) -> Option<Directive> {
        let deadline =
            Instant::now() + Duration::from_secs(self.config.health_check_interval_secs);
        loop {
            if self.project.shutdown_requested() {
                return None;
            }
            if let Some(line) = reader.next_line(POLL_SLICE_MS) {
                return Some(parse_directive(&line));
            }
            if Instant::now() >= deadline {
                return None;
            }
        }
    }

    /// Apply one directive. Returns false when the daemon should exit.
    fn handle_directive(&mut self, directive: &Directive) -> Result<bool> {
        match directive.r#type.as_str() {
            "shutdown" => return Ok(false),
            "resume" => self.resume_run()?,
            "status" => {
                if let Some(state) = self.project.load_state()? {
                    info!("\n{}", crate::lifecycle::format_run_summary(&state));
                }
            }
            other => {
                warn!("ignoring unknown directive: {other}");
            }
        }
        Ok(true)
    }

    /// Resume a stopped run in place: compute the plan, log it, apply it.
    fn resume_run(&mut self) -> Result<()> {
        let Some(state) = self.project.load_state()? else {
            warn!("resume directive received but no run exists");
            return Ok(());
        };
        match compute_resume_strategy(&state) {
            Ok(strategy) => {
                let resumed = execute_resume(state, &strategy);
                self.project.audit_log().append(
                    actions::DAEMON_RESUME,
                    &format!("resuming at phase {}", strategy.resume_phase),
                )?;
                self.project.save_state(&resumed)?;
                self.activity.record(ActivityKind::StateTransition);
                info!("run resumed at phase {}", strategy.resume_phase);
            }
            Err(e) => warn!("resume refused: {e}"),
        }
        Ok(())
    }

    fn cleanup(&self) {
        let _ = fs::remove_file(self.project.pid_path());
        let _ = fs::remove_file(self.project.fifo_path());
        self.project.clear_shutdown();
    }
}
