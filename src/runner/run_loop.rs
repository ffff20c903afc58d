//! The serialized state of one run and the loop that drives it.
//!
//! Build outcomes, the restart deadline and child exits arrive on independent
//! channels. The loop applies each of them to `RunCore` under one lock, so no
//! two mutations of readiness, the pending restart or the child slot interleave.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::coordination::{ReadinessChange, ReadinessCoordinator, RestartScheduler};
use crate::domain::{ArtifactKind, BuildOutcome, RunEvent};
use crate::error::{RelaunchError, Result};
use crate::supervisor::{ExitKind, ExitNotice, LaunchSpec, ProcessSupervisor};
use crate::watch::WatchEvent;

/// Lifecycle of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopped,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct RunCore {
    state: RunState,
    readiness: ReadinessCoordinator,
    scheduler: RestartScheduler,
    supervisor: ProcessSupervisor,
    launch: LaunchSpec,
    extra_args: Vec<String>,
    settled_tx: Option<oneshot::Sender<()>>,
    fatal: Option<RelaunchError>,
    events: broadcast::Sender<RunEvent>,
}

impl RunCore {
    pub(crate) fn new(
        launch: LaunchSpec,
        extra_args: Vec<String>,
        scheduler: RestartScheduler,
        supervisor: ProcessSupervisor,
        settled_tx: oneshot::Sender<()>,
        events: broadcast::Sender<RunEvent>,
    ) -> Self {
        Self {
            state: RunState::Running,
            readiness: ReadinessCoordinator::new(),
            scheduler,
            supervisor,
            launch,
            extra_args,
            settled_tx: Some(settled_tx),
            fatal: None,
            events,
        }
    }

    pub(crate) fn state(&self) -> RunState {
        self.state
    }

    pub(crate) fn child_pid(&self) -> Option<u32> {
        self.supervisor.current().and_then(|child| child.pid())
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.scheduler.deadline()
    }

    pub(crate) fn stopping_count(&self) -> usize {
        self.supervisor.stopping_count()
    }

    /// The error that ended the run. Handed out once.
    pub(crate) fn take_fatal(&mut self) -> Option<RelaunchError> {
        self.fatal.take()
    }

    fn emit(&self, event: RunEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn on_outcome(&mut self, kind: ArtifactKind, outcome: BuildOutcome, now: Instant) {
        if self.state != RunState::Running {
            return;
        }
        tracing::info!(kind = %kind, outcome = ?outcome, "Build completed");
        self.emit(RunEvent::BuildCompleted { kind, outcome });

        match self.readiness.on_outcome(kind, outcome) {
            ReadinessChange::BecameReady => {
                self.emit(RunEvent::FullyReady);
                self.scheduler.request(self.extra_args.clone(), now);
                let due_in = self.scheduler.quiet_period();
                tracing::debug!(due_in_ms = due_in.as_millis() as u64, "Restart scheduled");
                self.emit(RunEvent::RestartScheduled { due_in });
            }
            ReadinessChange::LostReady => {
                if self.scheduler.cancel() {
                    tracing::debug!(kind = %kind, "Pending restart cancelled by failed build");
                }
            }
            ReadinessChange::Unchanged => {}
        }

        if self.readiness.all_settled() {
            if let Some(tx) = self.settled_tx.take() {
                tracing::debug!("First builds settled");
                let _ = tx.send(());
            }
        }
    }

    /// Run the pending restart if its quiet period is over.
    pub(crate) fn fire_due(&mut self, now: Instant) -> Result<()> {
        if self.state != RunState::Running {
            return Ok(());
        }
        let Some(args) = self.scheduler.take_due(now) else {
            return Ok(());
        };

        if let Some(live) = self.supervisor.current() {
            self.emit(RunEvent::ProcessStopping { pid: live.pid() });
        }
        let child = self.supervisor.restart(&self.launch, &args)?;
        let (pid, argv) = (child.pid(), child.args().to_vec());
        self.emit(RunEvent::ProcessStarted { pid, args: argv });
        Ok(())
    }

    /// Classify a child exit. An exit nobody asked for ends the run.
    pub(crate) fn on_exit(&mut self, notice: ExitNotice) -> Result<()> {
        let exit = self.supervisor.on_exit(notice);
        match exit.kind {
            ExitKind::Intentional => {
                self.emit(RunEvent::ProcessExited {
                    pid: exit.pid,
                    intentional: true,
                    code: exit.code,
                });
                Ok(())
            }
            ExitKind::Unexpected(error) => {
                self.emit(RunEvent::ProcessExited {
                    pid: exit.pid,
                    intentional: false,
                    code: exit.code,
                });
                Err(error)
            }
            ExitKind::Untracked => Ok(()),
        }
    }

    /// Cancel the pending restart and stop the child. Idempotent.
    pub(crate) fn shutdown(&mut self) {
        if self.state == RunState::Running {
            tracing::info!("Stopping run");
        }
        self.state = RunState::Stopped;
        self.settled_tx = None;
        if self.scheduler.cancel() {
            tracing::debug!("Pending restart cancelled by stop");
        }
        if let Some(ticket) = self.supervisor.stop() {
            self.emit(RunEvent::ProcessStopping { pid: ticket.pid });
        }
    }
}

/// Drives one run until it is cancelled or fails.
pub(crate) struct RunLoop {
    pub(crate) core: Arc<Mutex<RunCore>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) watch_rx: mpsc::UnboundedReceiver<WatchEvent>,
    pub(crate) exit_rx: mpsc::UnboundedReceiver<ExitNotice>,
    pub(crate) events: broadcast::Sender<RunEvent>,
    pub(crate) done: watch::Sender<bool>,
}

impl RunLoop {
    pub(crate) async fn run(mut self) {
        let result = self.drive().await;

        self.cancel.cancel();
        lock(&self.core).shutdown();
        self.drain_exits().await;

        match &result {
            Ok(()) => {
                tracing::info!("Run stopped");
                let _ = self.events.send(RunEvent::Stopped);
            }
            Err(e) if e.is_unexpected_exit() => {
                tracing::error!(error = %e, "Run failed: child process exited without a stop");
                let _ = self.events.send(RunEvent::Failed { reason: e.to_string() });
            }
            Err(e) => {
                tracing::error!(error = %e, "Run failed");
                let _ = self.events.send(RunEvent::Failed { reason: e.to_string() });
            }
        }

        if let Err(e) = result {
            lock(&self.core).fatal = Some(e);
        }
        let _ = self.done.send(true);
    }

    async fn drive(&mut self) -> Result<()> {
        loop {
            let deadline = lock(&self.core).deadline();

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Ok(()),

                Some(notice) = self.exit_rx.recv() => {
                    let outcome = lock(&self.core).on_exit(notice);
                    outcome?;
                }

                Some(event) = self.watch_rx.recv() => match event {
                    WatchEvent::Outcome { kind, outcome } => {
                        lock(&self.core).on_outcome(kind, outcome, Instant::now());
                    }
                    WatchEvent::Ended { kind, reason } => {
                        return Err(RelaunchError::Watch { kind, reason });
                    }
                },

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let fired = lock(&self.core).fire_due(Instant::now());
                    fired?;
                }
            }
        }
    }

    /// Wait for every stopped child to be reaped.
    async fn drain_exits(&mut self) {
        loop {
            let pending = lock(&self.core).stopping_count();
            if pending == 0 {
                break;
            }
            match self.exit_rx.recv().await {
                Some(notice) => {
                    let _ = lock(&self.core).on_exit(notice);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const QUIET: Duration = Duration::from_millis(1000);

    fn new_core(launch: LaunchSpec) -> (RunCore, broadcast::Receiver<RunEvent>, oneshot::Receiver<()>) {
        let (events, rx) = broadcast::channel(64);
        let (settled_tx, settled_rx) = oneshot::channel();
        let (supervisor, _exit_rx) = ProcessSupervisor::channel(Duration::from_secs(1));
        let core = RunCore::new(
            launch,
            vec!["--extra".to_string()],
            RestartScheduler::new(QUIET),
            supervisor,
            settled_tx,
            events,
        );
        (core, rx, settled_rx)
    }

    fn drain(rx: &mut broadcast::Receiver<RunEvent>) -> Vec<RunEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn test_joint_success_schedules_one_restart() {
        let (mut core, mut rx, _settled) = new_core(LaunchSpec::new("true"));
        let t0 = Instant::now();

        core.on_outcome(ArtifactKind::Main, BuildOutcome::Success, t0);
        core.on_outcome(ArtifactKind::Preload, BuildOutcome::Success, t0);
        core.on_outcome(ArtifactKind::Main, BuildOutcome::Success, t0);

        let events = drain(&mut rx);
        assert_eq!(events.iter().filter(|e| **e == RunEvent::FullyReady).count(), 1);
        assert!(events.contains(&RunEvent::RestartScheduled { due_in: QUIET }));
        assert_eq!(core.deadline(), Some(t0 + QUIET));
    }

    #[tokio::test]
    async fn test_failed_build_cancels_pending_restart() {
        let (mut core, _rx, _settled) = new_core(LaunchSpec::new("true"));
        let t0 = Instant::now();

        core.on_outcome(ArtifactKind::Main, BuildOutcome::Success, t0);
        core.on_outcome(ArtifactKind::Preload, BuildOutcome::Success, t0);
        core.on_outcome(ArtifactKind::Preload, BuildOutcome::Error, t0);

        assert_eq!(core.deadline(), None);
        core.fire_due(t0 + QUIET).unwrap();
        assert_eq!(core.child_pid(), None);
    }

    #[tokio::test]
    async fn test_settled_after_first_cycle_of_each() {
        let (mut core, _rx, mut settled) = new_core(LaunchSpec::new("true"));
        let t0 = Instant::now();

        core.on_outcome(ArtifactKind::Main, BuildOutcome::Error, t0);
        assert!(settled.try_recv().is_err());
        core.on_outcome(ArtifactKind::Preload, BuildOutcome::Error, t0);
        assert!(settled.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_restart_and_ignores_outcomes() {
        let (mut core, mut rx, _settled) = new_core(LaunchSpec::new("true"));
        let t0 = Instant::now();
        core.on_outcome(ArtifactKind::Main, BuildOutcome::Success, t0);
        core.on_outcome(ArtifactKind::Preload, BuildOutcome::Success, t0);

        core.shutdown();
        assert_eq!(core.state(), RunState::Stopped);
        assert_eq!(core.deadline(), None);

        drain(&mut rx);
        core.on_outcome(ArtifactKind::Main, BuildOutcome::Success, t0);
        assert!(drain(&mut rx).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fire_due_starts_with_latest_args() {
        let (mut core, mut rx, _settled) = new_core(LaunchSpec::new("sh").args(["-c", "exec sleep 30", "relaunch"]));
        let t0 = Instant::now();
        core.on_outcome(ArtifactKind::Main, BuildOutcome::Success, t0);
        core.on_outcome(ArtifactKind::Preload, BuildOutcome::Success, t0);

        core.fire_due(t0 + Duration::from_millis(999)).unwrap();
        assert_eq!(core.child_pid(), None);

        core.fire_due(t0 + QUIET).unwrap();
        assert!(core.child_pid().is_some());
        let started = drain(&mut rx)
            .into_iter()
            .find(|e| matches!(e, RunEvent::ProcessStarted { .. }));
        assert!(matches!(
            started,
            Some(RunEvent::ProcessStarted { args, .. }) if args == ["-c", "exec sleep 30", "relaunch", "--extra"]
        ));

        core.shutdown();
        assert_eq!(core.child_pid(), None);
        assert_eq!(core.stopping_count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rebuild_failure_then_recovery_timeline() {
        let (mut core, mut rx, _settled) = new_core(LaunchSpec::new("sh").args(["-c", "exec sleep 30"]));
        let t0 = Instant::now();
        let at = |ms: u64| t0 + Duration::from_millis(ms);

        // t=0: both artifacts succeed
        core.on_outcome(ArtifactKind::Main, BuildOutcome::Success, at(0));
        core.on_outcome(ArtifactKind::Preload, BuildOutcome::Success, at(0));
        assert_eq!(core.deadline(), Some(at(1000)));

        // t=1000: process A
        core.fire_due(at(1000)).unwrap();
        let a = core.child_pid().unwrap();
        assert_eq!(core.deadline(), None);
        drain(&mut rx);

        // t=1050: preload fails, nothing scheduled, A keeps running
        core.on_outcome(ArtifactKind::Preload, BuildOutcome::Error, at(1050));
        assert_eq!(core.deadline(), None);
        assert!(!drain(&mut rx).contains(&RunEvent::FullyReady));
        assert_eq!(core.child_pid(), Some(a));

        // t=1200: preload recovers, restart due at 2200
        core.on_outcome(ArtifactKind::Preload, BuildOutcome::Success, at(1200));
        assert_eq!(core.deadline(), Some(at(2200)));
        let events = drain(&mut rx);
        assert!(events.contains(&RunEvent::FullyReady));
        assert!(events.contains(&RunEvent::RestartScheduled { due_in: QUIET }));

        core.fire_due(at(2199)).unwrap();
        assert_eq!(core.child_pid(), Some(a));
        assert_eq!(core.stopping_count(), 0);

        // t=2200: A stopped, B started
        core.fire_due(at(2200)).unwrap();
        let b = core.child_pid().unwrap();
        assert_ne!(a, b);
        assert_eq!(core.stopping_count(), 1);
        let events = drain(&mut rx);
        let stopping = events.iter().position(|e| *e == RunEvent::ProcessStopping { pid: Some(a) });
        let started = events
            .iter()
            .position(|e| matches!(e, RunEvent::ProcessStarted { pid, .. } if *pid == Some(b)));
        assert!(stopping.is_some() && started.is_some());
        assert!(stopping < started);

        core.shutdown();
    }

    #[tokio::test]
    async fn test_launch_failure_is_fatal() {
        let (mut core, _rx, _settled) = new_core(LaunchSpec::new("/nonexistent/relaunch-runtime"));
        let t0 = Instant::now();
        core.on_outcome(ArtifactKind::Main, BuildOutcome::Success, t0);
        core.on_outcome(ArtifactKind::Preload, BuildOutcome::Success, t0);

        let err = core.fire_due(t0 + QUIET).unwrap_err();
        assert!(matches!(err, RelaunchError::Launch { .. }));
    }
}
