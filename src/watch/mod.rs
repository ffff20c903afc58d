//! Build watch layer - the boundary to the build toolchain
//!
//! This module provides:
//! - BuildWatcher / Subscription traits for a watch-mode build
//! - WatchSession: one artifact's subscription, reporting two-state outcomes
//! - CommandWatcher: runs a watch-mode build command and reads its output
//! - ChannelWatcher: build cycles fed by hand, for embedding and tests

pub mod channel;
pub mod command;
pub mod session;

use async_trait::async_trait;

use crate::config::ArtifactConfig;
use crate::domain::{ArtifactKind, BuildOutcome};
use crate::error::Result;

pub use channel::ChannelWatcher;
pub use command::{CommandWatcher, LineClassifier};
pub use session::{WatchEvent, WatchSession};

/// One completed compile cycle as reported by the toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildCycle {
    /// The toolchain itself failed for this cycle
    Failed(String),
    /// Compilation ran; non-empty `errors` means the build is broken
    Compiled { errors: Vec<String> },
}

impl BuildCycle {
    /// A cycle that compiled cleanly
    pub fn success() -> Self {
        BuildCycle::Compiled { errors: Vec::new() }
    }

    /// A cycle that compiled with errors
    pub fn with_errors<I, S>(errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BuildCycle::Compiled {
            errors: errors.into_iter().map(Into::into).collect(),
        }
    }

    pub fn outcome(&self) -> BuildOutcome {
        match self {
            BuildCycle::Compiled { errors } if errors.is_empty() => BuildOutcome::Success,
            _ => BuildOutcome::Error,
        }
    }
}

/// A live watch on one artifact.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next completed cycle. `None` once the watch has ended.
    async fn next_cycle(&mut self) -> Option<BuildCycle>;

    /// Close the underlying watch.
    async fn close(&mut self);
}

/// Starts watch-mode builds.
#[async_trait]
pub trait BuildWatcher: Send + Sync {
    async fn watch(&self, kind: ArtifactKind, config: &ArtifactConfig) -> Result<Box<dyn Subscription>>;
}
