//! Single-slot child process supervision.
//!
//! The ProcessSupervisor tracks at most one live child. Every launched child
//! gets an observer task that reports its exit exactly once through an
//! `ExitNotice`. Stopping moves the handle into the `Stopping` state *before*
//! the termination request is sent, so the exit that follows is recognised as
//! intentional no matter how the two race.

use std::collections::HashMap;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};

use super::launch::LaunchSpec;
use super::terminate::{exit_signal, terminate};
use crate::error::{RelaunchError, Result};

/// Monotonic identifier of one launch, unique per supervisor.
pub type LaunchId = u64;

/// Lifecycle tag of a tracked child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Running,
    Stopping,
}

/// A launched child process.
#[derive(Debug)]
pub struct ChildHandle {
    id: LaunchId,
    pid: Option<u32>,
    args: Vec<String>,
    state: ChildState,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl ChildHandle {
    pub fn id(&self) -> LaunchId {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn state(&self) -> ChildState {
        self.state
    }
}

/// Sent by the observer task once the OS reports the child has terminated.
#[derive(Debug)]
pub struct ExitNotice {
    pub id: LaunchId,
    pub pid: Option<u32>,
    pub status: io::Result<ExitStatus>,
}

/// Returned by `stop()` for the child that was asked to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTicket {
    pub id: LaunchId,
    pub pid: Option<u32>,
}

/// How an exit was classified.
#[derive(Debug)]
pub enum ExitKind {
    /// The child was stopped by this supervisor
    Intentional,
    /// The child ended without a preceding stop; fatal for the run
    Unexpected(RelaunchError),
    /// Not a child this supervisor knows about
    Untracked,
}

/// Classified exit of one child.
#[derive(Debug)]
pub struct ChildExit {
    pub id: LaunchId,
    pub pid: Option<u32>,
    pub code: Option<i32>,
    pub kind: ExitKind,
}

/// Owns the single child-process slot.
pub struct ProcessSupervisor {
    current: Option<ChildHandle>,
    stopping: HashMap<LaunchId, ChildHandle>,
    next_id: LaunchId,
    kill_grace: Duration,
    exit_tx: mpsc::UnboundedSender<ExitNotice>,
}

impl ProcessSupervisor {
    /// Create a supervisor reporting exits on `exit_tx`.
    pub fn new(kill_grace: Duration, exit_tx: mpsc::UnboundedSender<ExitNotice>) -> Self {
        Self {
            current: None,
            stopping: HashMap::new(),
            next_id: 1,
            kill_grace,
            exit_tx,
        }
    }

    /// Create a supervisor together with the receiving end of its exit channel.
    pub fn channel(kill_grace: Duration) -> (Self, mpsc::UnboundedReceiver<ExitNotice>) {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        (Self::new(kill_grace, exit_tx), exit_rx)
    }

    /// Check if a child is tracked as live
    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    /// The live child, if any
    pub fn current(&self) -> Option<&ChildHandle> {
        self.current.as_ref()
    }

    /// Number of stopped children whose exit has not been observed yet
    pub fn stopping_count(&self) -> usize {
        self.stopping.len()
    }

    /// A stopped child still waiting for its exit
    pub fn stopping_handle(&self, id: LaunchId) -> Option<&ChildHandle> {
        self.stopping.get(&id)
    }

    /// Launch the executable. Fails if a child is already live.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, spec: &LaunchSpec, extra_args: &[String]) -> Result<&ChildHandle> {
        if let Some(live) = &self.current {
            return Err(RelaunchError::AlreadyRunning { pid: live.pid });
        }

        let args = spec.argv(extra_args);
        let child = spec
            .command(extra_args)
            .spawn()
            .map_err(|source| RelaunchError::Launch {
                executable: spec.executable.clone(),
                source,
            })?;

        let id = self.next_id;
        self.next_id += 1;
        let pid = child.id();
        let (kill_tx, kill_rx) = oneshot::channel();

        tracing::info!(launch_id = id, pid = ?pid, executable = %spec.executable, args = ?args, "Started child process");
        self.observe(id, child, kill_rx);

        Ok(self.current.insert(ChildHandle {
            id,
            pid,
            args,
            state: ChildState::Running,
            kill_tx: Some(kill_tx),
        }))
    }

    /// Stop the live child, if any. Returns without waiting for the exit.
    pub fn stop(&mut self) -> Option<StopTicket> {
        let mut handle = self.current.take()?;

        // Tag first, signal second
        handle.state = ChildState::Stopping;
        let ticket = StopTicket {
            id: handle.id,
            pid: handle.pid,
        };

        tracing::info!(launch_id = handle.id, pid = ?handle.pid, "Shutting down child process");
        if let Some(kill_tx) = handle.kill_tx.take() {
            // A closed receiver means the observer already saw the exit
            let _ = kill_tx.send(());
        }
        self.stopping.insert(handle.id, handle);

        Some(ticket)
    }

    /// Stop whatever is live, then launch a fresh child.
    pub fn restart(&mut self, spec: &LaunchSpec, extra_args: &[String]) -> Result<&ChildHandle> {
        self.stop();
        self.start(spec, extra_args)
    }

    /// Classify an exit reported by an observer task.
    ///
    /// The handle's state decides: a child tagged `Stopping` exited because it
    /// was asked to, a `Running` one ended on its own.
    pub fn on_exit(&mut self, notice: ExitNotice) -> ChildExit {
        let ExitNotice { id, pid, status } = notice;
        let code = status.as_ref().ok().and_then(ExitStatus::code);

        let handle = match self.stopping.remove(&id) {
            Some(handle) => Some(handle),
            None if self.current.as_ref().is_some_and(|live| live.id == id) => self.current.take(),
            None => None,
        };

        let kind = match handle.map(|h| h.state) {
            Some(ChildState::Stopping) => {
                tracing::debug!(launch_id = id, pid = ?pid, code = ?code, "Child exited after stop");
                ExitKind::Intentional
            }
            Some(ChildState::Running) => {
                let error = Self::classify(status);
                tracing::error!(launch_id = id, pid = ?pid, error = %error, "Child process ended on its own");
                ExitKind::Unexpected(error)
            }
            None => {
                tracing::debug!(launch_id = id, pid = ?pid, "Ignoring exit of untracked child");
                ExitKind::Untracked
            }
        };

        ChildExit { id, pid, code, kind }
    }

    fn classify(status: io::Result<ExitStatus>) -> RelaunchError {
        match status {
            Ok(status) => match status.code() {
                Some(0) => RelaunchError::UnexpectedExit,
                Some(code) => RelaunchError::ChildFailed { code },
                None => RelaunchError::ChildKilled {
                    signal: exit_signal(&status),
                },
            },
            Err(e) => RelaunchError::Io(e),
        }
    }

    /// Spawn the exit observer for one child.
    ///
    /// The kill channel resolves both on an explicit stop and when the handle
    /// is dropped, so a dropped supervisor never leaks its child.
    fn observe(&self, id: LaunchId, mut child: Child, kill_rx: oneshot::Receiver<()>) {
        let exit_tx = self.exit_tx.clone();
        let grace = self.kill_grace;
        let pid = child.id();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => terminate(&mut child, grace).await,
            };
            // Receiver gone means nobody is supervising anymore
            let _ = exit_tx.send(ExitNotice { id, pid, status });
        });
    }
}
