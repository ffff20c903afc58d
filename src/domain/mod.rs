//! Domain types for relaunch
//!
//! This module contains the core domain types:
//! - ArtifactKind: The two independently rebuilt bundles (main, preload)
//! - BuildOutcome: Two-state result of one watch cycle
//! - RunEvent: Observable milestones of a supervised run

pub mod artifact;
pub mod event;

pub use artifact::{ArtifactKind, BuildOutcome};
pub use event::RunEvent;
