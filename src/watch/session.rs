//! Watch session for a single artifact.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{BuildCycle, BuildWatcher, Subscription};
use crate::config::ArtifactConfig;
use crate::domain::{ArtifactKind, BuildOutcome};
use crate::error::Result;

/// What a session reports upward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// One build cycle finished
    Outcome { kind: ArtifactKind, outcome: BuildOutcome },
    /// The watch ended without being stopped
    Ended { kind: ArtifactKind, reason: String },
}

/// Wraps one artifact's subscription and reports every cycle as an outcome.
///
/// Knows nothing about restart policy.
pub struct WatchSession {
    kind: ArtifactKind,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl WatchSession {
    /// Subscribe to the artifact's builds and start reporting on `events`.
    pub async fn start<W>(
        watcher: &W,
        kind: ArtifactKind,
        config: &ArtifactConfig,
        events: mpsc::UnboundedSender<WatchEvent>,
        cancel: CancellationToken,
    ) -> Result<Self>
    where
        W: BuildWatcher + ?Sized,
    {
        let subscription = watcher.watch(kind, config).await?;
        tracing::debug!(kind = %kind, command = %config.command, "Watch session started");

        let task = tokio::spawn(Self::pump(kind, subscription, events, cancel.clone()));
        Ok(Self { kind, cancel, task })
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Close the subscription. No outcome is reported after this returns.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the subscription has been closed.
    pub async fn join(mut self) {
        if let Err(e) = (&mut self.task).await {
            tracing::error!(kind = %self.kind, error = ?e, "Watch session task panicked");
        }
    }

    async fn pump(
        kind: ArtifactKind,
        mut subscription: Box<dyn Subscription>,
        events: mpsc::UnboundedSender<WatchEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let cycle = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                cycle = subscription.next_cycle() => cycle,
            };

            // Checked again: stop may have landed while the cycle was in flight
            if cancel.is_cancelled() {
                break;
            }

            let event = match cycle {
                Some(cycle) => {
                    if let BuildCycle::Failed(reason) = &cycle {
                        tracing::warn!(kind = %kind, reason = %reason, "Build toolchain error");
                    }
                    WatchEvent::Outcome {
                        kind,
                        outcome: cycle.outcome(),
                    }
                }
                None => {
                    let _ = events.send(WatchEvent::Ended {
                        kind,
                        reason: "build watcher ended".to_string(),
                    });
                    break;
                }
            };

            if events.send(event).is_err() {
                break;
            }
        }

        subscription.close().await;
        tracing::debug!(kind = %kind, "Watch session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::ChannelWatcher;
    use std::time::Duration;

    async fn recv(rx: &mut mpsc::UnboundedReceiver<WatchEvent>) -> Option<WatchEvent> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.ok().flatten()
    }

    #[tokio::test]
    async fn test_reports_every_cycle_in_order() {
        let watcher = ChannelWatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = WatchSession::start(
            &watcher,
            ArtifactKind::Main,
            &ArtifactConfig::default(),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(session.kind(), ArtifactKind::Main);

        watcher.emit(ArtifactKind::Main, BuildCycle::success());
        watcher.emit(ArtifactKind::Main, BuildCycle::with_errors(["oops"]));
        watcher.emit(ArtifactKind::Main, BuildCycle::Failed("toolchain".into()));

        for expected in [BuildOutcome::Success, BuildOutcome::Error, BuildOutcome::Error] {
            assert_eq!(
                recv(&mut rx).await,
                Some(WatchEvent::Outcome {
                    kind: ArtifactKind::Main,
                    outcome: expected
                })
            );
        }
    }

    #[tokio::test]
    async fn test_no_outcomes_after_stop() {
        let watcher = ChannelWatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = WatchSession::start(
            &watcher,
            ArtifactKind::Preload,
            &ArtifactConfig::default(),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        session.stop();
        assert!(session.is_stopped());
        session.join().await;

        watcher.emit(ArtifactKind::Preload, BuildCycle::success());
        // The session dropped its sender on exit, so the channel is closed and empty
        assert_eq!(recv(&mut rx).await, None);
    }

    #[tokio::test]
    async fn test_reports_watch_end() {
        let watcher = ChannelWatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _session = WatchSession::start(
            &watcher,
            ArtifactKind::Main,
            &ArtifactConfig::default(),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        watcher.end(ArtifactKind::Main);
        assert!(matches!(
            recv(&mut rx).await,
            Some(WatchEvent::Ended {
                kind: ArtifactKind::Main,
                ..
            })
        ));
    }
}
