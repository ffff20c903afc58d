//! Readiness aggregation across the tracked artifacts.

use std::collections::{HashMap, HashSet};

use crate::domain::{ArtifactKind, BuildOutcome};

/// What a single outcome did to the aggregate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessChange {
    /// Aggregate state did not change
    Unchanged,
    /// Transitioned into "every artifact's last build succeeded"
    BecameReady,
    /// Was fully ready, an artifact's build just failed
    LostReady,
}

/// Tracks whether each artifact's most recent build succeeded.
///
/// Edge-triggered: `BecameReady` is reported only on the transition into the
/// fully-ready state, never again while it holds.
#[derive(Debug, Clone)]
pub struct ReadinessCoordinator {
    ready: HashMap<ArtifactKind, bool>,
    settled: HashSet<ArtifactKind>,
    fully_ready: bool,
}

impl Default for ReadinessCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessCoordinator {
    /// Create a coordinator with every artifact not ready
    pub fn new() -> Self {
        Self {
            ready: ArtifactKind::ALL.iter().map(|kind| (*kind, false)).collect(),
            settled: HashSet::new(),
            fully_ready: false,
        }
    }

    /// Record one build outcome and report the resulting transition.
    pub fn on_outcome(&mut self, kind: ArtifactKind, outcome: BuildOutcome) -> ReadinessChange {
        self.ready.insert(kind, outcome.is_success());
        self.settled.insert(kind);

        let now_ready = ArtifactKind::ALL
            .iter()
            .all(|kind| self.ready.get(kind).copied().unwrap_or(false));
        let was_ready = std::mem::replace(&mut self.fully_ready, now_ready);

        match (was_ready, now_ready) {
            (false, true) => ReadinessChange::BecameReady,
            (true, false) => ReadinessChange::LostReady,
            _ => ReadinessChange::Unchanged,
        }
    }

    /// Check if an artifact's last build succeeded
    pub fn is_ready(&self, kind: ArtifactKind) -> bool {
        self.ready.get(&kind).copied().unwrap_or(false)
    }

    /// Check if every artifact's last build succeeded
    pub fn is_fully_ready(&self) -> bool {
        self.fully_ready
    }

    /// Check if every artifact has reported at least one cycle
    pub fn all_settled(&self) -> bool {
        ArtifactKind::ALL.iter().all(|kind| self.settled.contains(kind))
    }
}
