//! Process supervisor - owns the single child-process slot
//!
//! This module provides:
//! - LaunchSpec: what to run for every (re)start
//! - ProcessSupervisor: start/stop with at most one live child
//! - Exit observation that tells a requested stop apart from a crash

mod launch;
mod process;
mod terminate;

pub use launch::LaunchSpec;
pub use process::{ChildExit, ChildHandle, ChildState, ExitKind, ExitNotice, LaunchId, ProcessSupervisor, StopTicket};
