//! Listener process supervision
//!
//! The supervisor owns the child lifecycle: spawn the listener, watch
//! the shared status file, restart on request or on schedule, and
//! never kill a child that is mid-command. Restarts reclaim whatever
//! the long-running child has leaked (audio handles, native engine
//! state) by replacing the whole process.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};

use crate::error::{Error, Result};
use crate::status::{Status, StatusLock};

/// Poll cadence while the child runs normally
const POLL_RUNNING: Duration = Duration::from_millis(500);

/// Poll cadence while waiting for a busy child to go idle
const POLL_AWAITING: Duration = Duration::from_millis(100);

/// Grace period between SIGTERM and a forced kill
const TERM_GRACE: Duration = Duration::from_secs(2);

/// Restart behavior knobs
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    /// Replace the child on this schedule even when healthy
    pub restart_interval: Duration,

    /// Consecutive self-exits tolerated before giving up
    pub max_start_failures: u32,
}

/// Where the supervisor is in the child lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisorState {
    Starting,
    Running,
    AwaitingSafeRestart,
    Terminating,
    Stopped,
}

/// Why a watch round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    /// Child exited 0 on its own: a stop directive
    CleanExit,
    /// Child exited non-zero on its own
    SelfExit(i32),
    /// Interrupt received
    Shutdown,
    /// Child asked to be replaced
    RestartRequested,
    /// Scheduled restart interval elapsed
    IntervalElapsed,
}

/// Spawns and replaces the listener child process
pub struct Supervisor {
    program: PathBuf,
    args: Vec<String>,
    status: StatusLock,
    policy: RestartPolicy,
    state: SupervisorState,
}

impl Supervisor {
    /// Create a supervisor that runs `program` with `args` as the
    /// listener child
    #[must_use]
    pub fn new(program: PathBuf, args: Vec<String>, status: StatusLock, policy: RestartPolicy) -> Self {
        Self {
            program,
            args,
            status,
            policy,
            state: SupervisorState::Stopped,
        }
    }

    /// Run until the child stops cleanly, an interrupt arrives, or the
    /// startup-failure budget is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Supervisor`] after `max_start_failures`
    /// consecutive child self-exits, or on spawn/status-file failures.
    pub async fn run(&mut self) -> Result<()> {
        let shutdown = Arc::new(AtomicBool::new(false));
        {
            let flag = Arc::clone(&shutdown);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, shutting down");
                    flag.store(true, Ordering::SeqCst);
                }
            });
        }

        let mut failures = 0_u32;

        loop {
            self.transition(SupervisorState::Starting);
            self.status.reset()?;
            let mut child = self.spawn_child()?;
            tracing::info!(pid = child.id(), "listener started");

            self.transition(SupervisorState::Running);
            let deadline = Instant::now() + self.policy.restart_interval;
            let end = self.watch(&mut child, deadline, &shutdown).await?;

            match end {
                RunEnd::CleanExit => {
                    tracing::info!("listener stopped cleanly");
                    self.transition(SupervisorState::Stopped);
                    return Ok(());
                }
                RunEnd::SelfExit(code) => {
                    failures += 1;
                    tracing::error!(code, failures, "listener exited with an error");
                    if failures >= self.policy.max_start_failures {
                        self.transition(SupervisorState::Stopped);
                        return Err(Error::Supervisor(format!(
                            "listener failed {failures} times in a row"
                        )));
                    }
                }
                RunEnd::Shutdown => {
                    self.await_not_busy(&mut child).await?;
                    self.terminate(child).await?;
                    self.transition(SupervisorState::Stopped);
                    return Ok(());
                }
                RunEnd::RestartRequested | RunEnd::IntervalElapsed => {
                    tracing::info!(reason = ?end, "replacing listener");
                    self.await_not_busy(&mut child).await?;
                    self.terminate(child).await?;
                    // A child that reached steady listening earns a
                    // fresh failure budget.
                    failures = 0;
                }
            }
        }
    }

    fn spawn_child(&self) -> Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Supervisor(format!("failed to spawn listener: {e}")))
    }

    /// Watch a running child until something requires action
    async fn watch(
        &mut self,
        child: &mut Child,
        deadline: Instant,
        shutdown: &AtomicBool,
    ) -> Result<RunEnd> {
        loop {
            if let Some(exit) = child.try_wait()? {
                return Ok(match exit.code() {
                    Some(0) => RunEnd::CleanExit,
                    Some(code) => RunEnd::SelfExit(code),
                    // Killed by an external signal.
                    None => RunEnd::SelfExit(-1),
                });
            }

            if shutdown.load(Ordering::SeqCst) {
                return Ok(RunEnd::Shutdown);
            }

            if self.status.read()? == Status::RestartRequested {
                return Ok(RunEnd::RestartRequested);
            }

            if Instant::now() >= deadline {
                return Ok(RunEnd::IntervalElapsed);
            }

            tokio::time::sleep(POLL_RUNNING).await;
        }
    }

    /// Block until the child is no longer mid-command. A child is
    /// never terminated while the status file reads `Busy`.
    async fn await_not_busy(&mut self, child: &mut Child) -> Result<()> {
        self.transition(SupervisorState::AwaitingSafeRestart);

        loop {
            if child.try_wait()?.is_some() {
                return Ok(());
            }
            if self.status.read()? != Status::Busy {
                return Ok(());
            }
            tokio::time::sleep(POLL_AWAITING).await;
        }
    }

    /// Terminate the child: SIGTERM, a short grace period, then a
    /// forced kill.
    async fn terminate(&mut self, mut child: Child) -> Result<()> {
        self.transition(SupervisorState::Terminating);

        if child.try_wait()?.is_some() {
            return Ok(());
        }

        if let Some(pid) = child.id() {
            let signaled = Command::new("kill")
                .arg("-TERM")
                .arg(pid.to_string())
                .status()
                .await
                .is_ok_and(|s| s.success());

            if signaled {
                let grace_end = Instant::now() + TERM_GRACE;
                while Instant::now() < grace_end {
                    if child.try_wait()?.is_some() {
                        tracing::debug!(pid, "listener terminated gracefully");
                        return Ok(());
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }

        tracing::warn!("listener did not terminate in time, killing");
        child.kill().await?;
        child.wait().await?;
        Ok(())
    }

    fn transition(&mut self, state: SupervisorState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "supervisor state");
            self.state = state;
        }
    }
}
