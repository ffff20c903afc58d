//! Relaunch - a development-time process supervisor
//!
//! Relaunch watches the two build artifacts of a desktop app (main and
//! preload) and restarts the app runtime once, after a quiet period, each
//! time both builds have just become good together.

pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod runner;
pub mod supervisor;
pub mod watch;

pub use config::Config;
pub use domain::{ArtifactKind, BuildOutcome, RunEvent};
pub use error::{RelaunchError, Result};
pub use runner::{ControllerConfig, RunController, RunState, RunTarget};
