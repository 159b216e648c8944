//! Cross-process restart coordination flag
//!
//! The supervisor and the listening child share a single tri-state value
//! through a small status file. The child is the only writer during its
//! lifetime (`Idle → Busy → {Idle | RestartRequested}`); the supervisor only
//! reads it, except that it resets the file to `Idle` each time a fresh
//! child is spawned.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Tri-state restart coordination value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No command in flight; safe to restart
    Idle,
    /// A command is being dispatched; restart must wait
    Busy,
    /// The child has decided it must be replaced; supervisor must act
    RestartRequested,
}

impl Status {
    /// Wire representation written to the status file
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::RestartRequested => "restart",
        }
    }

    /// Parse the wire representation
    ///
    /// # Errors
    ///
    /// Returns error if the value is not one of the three known states
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "idle" => Ok(Self::Idle),
            "busy" => Ok(Self::Busy),
            "restart" => Ok(Self::RestartRequested),
            other => Err(Error::Lock(format!("unknown status value: {other:?}"))),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File-backed shared status flag
///
/// Writes are atomic (temp file + rename) so a reader never observes a
/// partially written value.
#[derive(Debug, Clone)]
pub struct StatusLock {
    path: PathBuf,
}

impl StatusLock {
    /// Open a status lock at `path`, creating it as `Idle` if absent
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let lock = Self { path: path.into() };
        if !lock.path.exists() {
            lock.set(Status::Idle)?;
        }
        Ok(lock)
    }

    /// Reset the flag to `Idle`, replacing any previous value
    ///
    /// Called by the supervisor at every respawn so each child lifetime
    /// starts from a known state.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn reset(&self) -> Result<()> {
        self.set(Status::Idle)
    }

    /// Write a new status value
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn set(&self, status: Status) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, status.as_str())?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::trace!(status = %status, "status written");
        Ok(())
    }

    /// Read the current status value
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing or holds an unknown value
    pub fn read(&self) -> Result<Status> {
        let raw = std::fs::read_to_string(&self.path)?;
        Status::parse(&raw)
    }

    /// Path of the underlying status file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [Status::Idle, Status::Busy, Status::RestartRequested] {
            assert_eq!(Status::parse(status.as_str()).unwrap(), status);
        }
        assert!(Status::parse("banana").is_err());
    }

    #[test]
    fn open_creates_idle() {
        let dir = tempfile::tempdir().unwrap();
        let lock = StatusLock::open(dir.path().join("status")).unwrap();
        assert_eq!(lock.read().unwrap(), Status::Idle);
    }

    #[test]
    fn set_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let lock = StatusLock::open(dir.path().join("status")).unwrap();

        lock.set(Status::Busy).unwrap();
        assert_eq!(lock.read().unwrap(), Status::Busy);

        lock.set(Status::RestartRequested).unwrap();
        assert_eq!(lock.read().unwrap(), Status::RestartRequested);

        lock.reset().unwrap();
        assert_eq!(lock.read().unwrap(), Status::Idle);
    }

    #[test]
    fn two_handles_share_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status");
        let writer = StatusLock::open(&path).unwrap();
        let reader = StatusLock::open(&path).unwrap();

        writer.set(Status::Busy).unwrap();
        assert_eq!(reader.read().unwrap(), Status::Busy);
    }
}
