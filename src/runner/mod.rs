//! Run orchestration.
//!
//! This module provides:
//! - RunController: run/stop lifecycle over {Idle, Running, Stopped}
//! - RunTarget / ControllerConfig: run identity and fixed settings
//! - The event loop that serializes build outcomes, restart deadlines and child exits

mod controller;
mod run_loop;

pub use controller::{ControllerConfig, RunController, RunTarget};
pub use run_loop::RunState;
