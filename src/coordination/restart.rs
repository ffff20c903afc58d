//! Debounced restart scheduling.
//!
//! The scheduler is a plain state machine driven with explicit instants; the
//! caller sleeps until `deadline()` and then asks for `take_due()`. At most one
//! restart is pending at any time, and each request pushes the deadline out to
//! a full quiet period from that request.

use std::time::Duration;
use tokio::time::Instant;

/// A restart that has been requested but not executed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRestart {
    /// Extra launch arguments of the latest request
    pub args: Vec<String>,
    /// When the restart fires if nothing supersedes it
    pub due_at: Instant,
    /// How many requests were coalesced into this one
    pub coalesced: u32,
}

/// Coalesces bursts of restart requests into one.
#[derive(Debug, Clone)]
pub struct RestartScheduler {
    quiet_period: Duration,
    pending: Option<PendingRestart>,
}

impl RestartScheduler {
    /// Create a scheduler with the given quiet period
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            pending: None,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Request a restart, replacing any pending one. Returns the new deadline.
    pub fn request(&mut self, args: Vec<String>, now: Instant) -> Instant {
        let due_at = now + self.quiet_period;
        let coalesced = self.pending.as_ref().map_or(1, |p| p.coalesced + 1);
        if coalesced > 1 {
            tracing::debug!(coalesced, "Superseding pending restart");
        }
        self.pending = Some(PendingRestart {
            args,
            due_at,
            coalesced,
        });
        due_at
    }

    /// Drop any pending restart. Returns true if one was pending.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// The pending restart, if any
    pub fn pending(&self) -> Option<&PendingRestart> {
        self.pending.as_ref()
    }

    /// When the pending restart fires
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due_at)
    }

    /// Take the pending restart's args if its quiet period has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Option<Vec<String>> {
        match &self.pending {
            Some(pending) if pending.due_at <= now => self.pending.take().map(|p| p.args),
            _ => None,
        }
    }
}
