//! Run event types for observability.

use std::time::Duration;

use super::{ArtifactKind, BuildOutcome};

/// Milestones of a supervised run, broadcast to anyone watching the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// One artifact finished a watch cycle
    BuildCompleted { kind: ArtifactKind, outcome: BuildOutcome },
    /// Every artifact's latest build succeeded (edge, not level)
    FullyReady,
    /// A restart is pending and will fire after the quiet period
    RestartScheduled { due_in: Duration },
    /// A new child process is live
    ProcessStarted { pid: Option<u32>, args: Vec<String> },
    /// A live child was asked to terminate
    ProcessStopping { pid: Option<u32> },
    /// A child process has terminated
    ProcessExited {
        pid: Option<u32>,
        intentional: bool,
        code: Option<i32>,
    },
    /// The run was stopped on request
    Stopped,
    /// The run ended with a fatal error
    Failed { reason: String },
}

impl RunEvent {
    /// Check if this event ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Stopped | RunEvent::Failed { .. })
    }
}
