//! Build coordination
//!
//! Turns per-artifact build outcomes into restart decisions:
//! - ReadinessCoordinator: edge-triggered "both artifacts are good" detection
//! - RestartScheduler: debounces restart requests over a quiet period

pub mod readiness;
pub mod restart;

pub use readiness::{ReadinessChange, ReadinessCoordinator};
pub use restart::{PendingRestart, RestartScheduler};
