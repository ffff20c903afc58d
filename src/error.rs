//! Error types for relaunch
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::domain::ArtifactKind;

/// All error types that can occur while supervising a run
#[derive(Debug, Error)]
pub enum RelaunchError {
    /// The OS could not spawn the supervised executable
    #[error("Failed to launch {executable}: {source}")]
    Launch {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    /// A start was requested while a child is still tracked as live
    #[error("Child process already running (pid {pid:?})")]
    AlreadyRunning { pid: Option<u32> },

    /// The child exited on its own with a non-zero code
    #[error("Child process ended with error code: {code}")]
    ChildFailed { code: i32 },

    /// The child exited cleanly without being asked to stop
    #[error("Child process exited unexpectedly")]
    UnexpectedExit,

    /// The child was terminated by a signal this supervisor did not send
    #[error("Child process was killed (signal {signal:?})")]
    ChildKilled { signal: Option<i32> },

    /// A build watch could not be created or ended on its own
    #[error("Watch error ({kind}): {reason}")]
    Watch { kind: ArtifactKind, reason: String },

    /// Configuration is incomplete or inconsistent
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RelaunchError {
    /// True for every way the child can end without a preceding stop
    pub fn is_unexpected_exit(&self) -> bool {
        matches!(
            self,
            Self::ChildFailed { .. } | Self::UnexpectedExit | Self::ChildKilled { .. }
        )
    }
}

/// Result type alias for relaunch operations
pub type Result<T> = std::result::Result<T, RelaunchError>;
