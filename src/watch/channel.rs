//! In-process BuildWatcher fed by hand.
//!
//! Cycles emitted before anyone subscribes are kept and delivered to the first
//! subscription. Cycles emitted to a closed subscription are dropped.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use super::{BuildCycle, BuildWatcher, Subscription};
use crate::config::ArtifactConfig;
use crate::domain::ArtifactKind;
use crate::error::Result;

#[derive(Default)]
struct Slot {
    tx: Option<mpsc::UnboundedSender<BuildCycle>>,
    backlog: Vec<BuildCycle>,
    subscriptions: usize,
}

#[derive(Default)]
pub struct ChannelWatcher {
    slots: Mutex<HashMap<ArtifactKind, Slot>>,
}

impl ChannelWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ArtifactKind, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Report a completed cycle for `kind`.
    pub fn emit(&self, kind: ArtifactKind, cycle: BuildCycle) {
        let mut slots = self.slots();
        let slot = slots.entry(kind).or_default();
        match &slot.tx {
            Some(tx) => {
                if tx.send(cycle).is_err() {
                    tracing::trace!(kind = %kind, "Cycle dropped, subscription closed");
                }
            }
            None => slot.backlog.push(cycle),
        }
    }

    /// End the current watch on `kind` as if its build tool had died.
    pub fn end(&self, kind: ArtifactKind) {
        if let Some(slot) = self.slots().get_mut(&kind) {
            slot.tx = None;
        }
    }

    /// How many times `kind` has been subscribed to
    pub fn subscriptions(&self, kind: ArtifactKind) -> usize {
        self.slots().get(&kind).map_or(0, |slot| slot.subscriptions)
    }
}

#[async_trait]
impl BuildWatcher for ChannelWatcher {
    async fn watch(&self, kind: ArtifactKind, _config: &ArtifactConfig) -> Result<Box<dyn Subscription>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slots = self.slots();
        let slot = slots.entry(kind).or_default();
        for cycle in slot.backlog.drain(..) {
            let _ = tx.send(cycle);
        }
        slot.tx = Some(tx);
        slot.subscriptions += 1;
        Ok(Box::new(ChannelSubscription { rx }))
    }
}

struct ChannelSubscription {
    rx: mpsc::UnboundedReceiver<BuildCycle>,
}

#[async_trait]
impl Subscription for ChannelSubscription {
    async fn next_cycle(&mut self) -> Option<BuildCycle> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}
