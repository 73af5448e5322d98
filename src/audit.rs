//! Append-only audit log.
//!
//! Every state-affecting orchestration action is appended to
//! `<control-dir>/audit.jsonl`, one JSON record per line. The log's total
//! order is the source of truth for crash recovery: the mutable `state.json`
//! is a cache, and [`crate::lifecycle::replay`] reconstructs a `RunState`
//! from scratch by folding over these entries.
//!
//! Entries are never mutated or removed; there is exactly one logical writer
//! per run.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Fixed action vocabulary. Free strings are accepted on read for forward
/// compatibility, but writers should stick to these.
pub mod actions {
    pub const INTERVIEW: &str = "interview";
    pub const SHAPE: &str = "shape";
    pub const SHAPE_ERROR: &str = "shape_error";
    pub const BUILD: &str = "build";
    pub const SYSTEMIC_FAILURE: &str = "systemic_failure";
    pub const DAEMON_DISPATCH: &str = "daemon_dispatch";
    pub const DAEMON_RESUME: &str = "daemon_resume";
    pub const DAEMON_SHUTDOWN: &str = "daemon_shutdown";
    pub const RESUME: &str = "resume";
}

/// One immutable, timestamped record of an orchestration action.
///
/// The shape of `detail` depends on `action` - e.g. a `build` entry encodes
/// `"<component_id>: <passed>/<total> passed"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub action: String,
    pub detail: String,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            action: action.into(),
            detail: detail.into(),
        }
    }
}

/// Handle to a project's audit log file.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry. Creates the file on first write.
    pub fn append(&self, action: &str, detail: &str) -> Result<AuditEntry> {
        let entry = AuditEntry::new(action, detail);
        let line = serde_json::to_string(&entry).context("Failed to serialize audit entry")?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open audit log: {}", self.path.display()))?;
        writeln!(file, "{line}").context("Failed to write audit entry")?;
        Ok(entry)
    }

    /// Load all entries in log order.
    ///
    /// Unparseable lines (e.g. a torn write from a crash mid-append) are
    /// skipped with a warning rather than failing the whole replay.
    pub fn load(&self) -> Result<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read audit log: {}", self.path.display()))?;

        let mut entries = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    "Skipping malformed audit line {} in {}: {}",
                    lineno + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(entries)
    }
}
