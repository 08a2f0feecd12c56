//! Single-instance guard.
//!
//! An exclusive `flock` on the lock file marks the running daemon. The kernel
//! drops the lock when the process exits, whatever the cause, so a crash never
//! leaves a stale guard behind. The file also carries a JSON record of the
//! holder so a second instance can say who is in the way.

use crate::error::{Result, TranscriberError};
use crate::sys::{self, LockAttempt};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

/// Who holds the lock, as written into the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderRecord {
    pub pid: u32,
    pub process_name: String,
    /// Unix timestamp in milliseconds.
    pub started_at_ms: u64,
}

impl HolderRecord {
    /// Record describing the current process.
    pub fn current() -> Self {
        let started_at_ms = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let process_name = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

        Self {
            pid: std::process::id(),
            process_name,
            started_at_ms,
        }
    }
}

/// Held for the daemon's whole lifetime. Dropping it releases the lock.
#[derive(Debug)]
pub struct SingletonGuard {
    file: File,
    path: PathBuf,
    record: HolderRecord,
}

impl SingletonGuard {
    /// Take the lock at `lock_path` or report the live holder.
    ///
    /// `identifiers` are the names under which a daemon may show up in the
    /// process table; a holder matching none of them is still a conflict but
    /// is reported as foreign.
    ///
    /// # Errors
    /// - `SingletonConflict` if another process holds the lock
    /// - `LockFile` if the lock file cannot be opened, locked or written
    pub fn acquire(lock_path: &Path, identifiers: &[&str]) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| lock_file_error("open", lock_path, e))?;

        match sys::try_lock_exclusive(&file).map_err(|e| lock_file_error("lock", lock_path, e))? {
            LockAttempt::Acquired => {}
            LockAttempt::HeldElsewhere => {
                let existing = read_record(&mut file).ok();
                return Err(conflict(existing, identifiers));
            }
        }

        let record = HolderRecord::current();
        write_record(&mut file, &record).map_err(|e| lock_file_error("write", lock_path, e))?;
        debug!(pid = record.pid, lock = %lock_path.display(), "singleton lock acquired");

        Ok(Self {
            file,
            path: lock_path.to_path_buf(),
            record,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &HolderRecord {
        &self.record
    }
}

impl Drop for SingletonGuard {
    fn drop(&mut self) {
        // The file stays: unlinking it would let two processes lock
        // different inodes under the same path.
        if let Err(e) = self.file.set_len(0) {
            warn!(lock = %self.path.display(), "failed to clear lock record: {}", e);
        }
        debug!(lock = %self.path.display(), "singleton lock released");
    }
}

fn lock_file_error(action: &str, path: &Path, e: std::io::Error) -> TranscriberError {
    TranscriberError::LockFile {
        message: format!("failed to {} {}: {}", action, path.display(), e),
    }
}

fn write_record(file: &mut File, record: &HolderRecord) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(json.as_bytes())?;
    file.sync_data()
}

fn read_record(file: &mut File) -> std::io::Result<HolderRecord> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Live process attributes used to identify a lock holder.
#[derive(Debug, Clone)]
struct ProcessInfo {
    name: String,
    command_line: String,
}

impl ProcessInfo {
    fn matches_any(&self, identifiers: &[&str]) -> bool {
        identifiers
            .iter()
            .any(|id| self.name.contains(id) || self.command_line.contains(id))
    }
}

fn inspect_process(pid: u32) -> Option<ProcessInfo> {
    if !sys::process_exists(pid) {
        return None;
    }

    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    let process = system.process(pid)?;

    // Linux truncates the kernel name to 15 bytes, so the command line is
    // checked as well.
    let command_line = process
        .cmd()
        .iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");

    Some(ProcessInfo {
        name: process.name().to_string_lossy().into_owned(),
        command_line,
    })
}

fn conflict(existing: Option<HolderRecord>, identifiers: &[&str]) -> TranscriberError {
    let Some(record) = existing else {
        // Holder has the lock but has not written its record yet
        return TranscriberError::SingletonConflict {
            pid: 0,
            holder: "unidentified process".to_string(),
        };
    };

    let holder = match inspect_process(record.pid) {
        Some(info) if info.matches_any(identifiers) => info.name,
        Some(info) => format!("unexpected process '{}'", info.name),
        None => format!("recorded as '{}', no longer visible", record.process_name),
    };

    TranscriberError::SingletonConflict {
        pid: record.pid,
        holder,
    }
}
