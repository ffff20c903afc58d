//! Top-level run orchestration.
//!
//! A RunController wires two watch sessions, the readiness coordinator, the
//! restart scheduler and the process supervisor into one run, and exposes
//! `run`/`stop` to the command layer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::run_loop::{RunCore, RunLoop, RunState, lock};
use crate::config::{ArtifactsConfig, Config};
use crate::coordination::RestartScheduler;
use crate::domain::{ArtifactKind, RunEvent};
use crate::error::Result;
use crate::supervisor::{LaunchSpec, ProcessSupervisor};
use crate::watch::{BuildWatcher, WatchSession};

/// What a run is for. Re-running with an equal target is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTarget {
    /// Identity of the run, typically the dev-server URL
    pub id: String,
    pub artifacts: ArtifactsConfig,
}

impl RunTarget {
    pub fn new(id: impl Into<String>, artifacts: ArtifactsConfig) -> Self {
        Self {
            id: id.into(),
            artifacts,
        }
    }
}

impl From<&Config> for RunTarget {
    fn from(config: &Config) -> Self {
        Self::new(config.target.clone(), config.artifacts.clone())
    }
}

/// Settings fixed for the lifetime of a controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub launch: LaunchSpec,
    pub quiet_period: Duration,
    pub kill_grace: Duration,
}

impl From<&Config> for ControllerConfig {
    fn from(config: &Config) -> Self {
        Self {
            launch: config.runtime.launch_spec(),
            quiet_period: config.quiet_period(),
            kill_grace: config.kill_grace(),
        }
    }
}

struct ActiveRun {
    target: RunTarget,
    core: Arc<Mutex<RunCore>>,
    cancel: CancellationToken,
    sessions: Vec<WatchSession>,
    done: watch::Receiver<bool>,
}

impl ActiveRun {
    fn state(&self) -> RunState {
        lock(&self.core).state()
    }

    fn stop(&self) {
        lock(&self.core).shutdown();
        for session in &self.sessions {
            session.stop();
        }
        self.cancel.cancel();
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Supervises one app runtime against two watch-mode builds.
pub struct RunController<W: BuildWatcher + 'static> {
    watcher: Arc<W>,
    config: ControllerConfig,
    events: broadcast::Sender<RunEvent>,
    active: Mutex<Option<ActiveRun>>,
}

impl<W: BuildWatcher + 'static> RunController<W> {
    pub fn new(watcher: Arc<W>, config: ControllerConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            watcher,
            config,
            events,
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> RunState {
        lock(&self.active).as_ref().map_or(RunState::Idle, ActiveRun::state)
    }

    /// Pid of the live child, if any
    pub fn child_pid(&self) -> Option<u32> {
        lock(&self.active)
            .as_ref()
            .and_then(|run| lock(&run.core).child_pid())
    }

    /// Start watching and supervising for `target`.
    ///
    /// Resolves once both artifacts have reported their first build cycle, or
    /// with the fatal error if the run ends before that. A run for an equal
    /// target that is still going is left alone; any other run is stopped
    /// first and its child reaped before the new watches start.
    pub async fn run(&self, target: RunTarget, extra_args: Vec<String>) -> Result<()> {
        let previous = {
            let mut active = lock(&self.active);
            let unchanged = active
                .as_ref()
                .is_some_and(|run| run.target == target && run.state() == RunState::Running);
            if unchanged {
                tracing::debug!(target_id = %target.id, "Already running for target");
                return Ok(());
            }
            active.take()
        };

        if let Some(previous) = previous {
            if previous.state() == RunState::Running {
                tracing::info!(previous_id = %previous.target.id, target_id = %target.id, "Target changed, stopping previous run");
            }
            previous.stop();
            let mut done = previous.done.clone();
            let _ = done.wait_for(|finished| *finished).await;
        }

        let cancel = CancellationToken::new();
        let (watch_tx, watch_rx) = mpsc::unbounded_channel();
        let mut sessions = Vec::with_capacity(ArtifactKind::ALL.len());
        for kind in ArtifactKind::ALL {
            let started = WatchSession::start(
                self.watcher.as_ref(),
                kind,
                target.artifacts.get(kind),
                watch_tx.clone(),
                cancel.child_token(),
            )
            .await;
            match started {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::error!(kind = %kind, error = %e, "Failed to start watch session");
                    cancel.cancel();
                    return Err(e);
                }
            }
        }
        drop(watch_tx);

        let (supervisor, exit_rx) = ProcessSupervisor::channel(self.config.kill_grace);
        let (settled_tx, settled_rx) = oneshot::channel();
        let (done_tx, done_rx) = watch::channel(false);
        let core = Arc::new(Mutex::new(RunCore::new(
            self.config.launch.clone(),
            extra_args,
            RestartScheduler::new(self.config.quiet_period),
            supervisor,
            settled_tx,
            self.events.clone(),
        )));

        tokio::spawn(
            RunLoop {
                core: core.clone(),
                cancel: cancel.clone(),
                watch_rx,
                exit_rx,
                events: self.events.clone(),
                done: done_tx,
            }
            .run(),
        );
        tracing::info!(target_id = %target.id, "Run started");

        let displaced = lock(&self.active).replace(ActiveRun {
            target,
            core: core.clone(),
            cancel,
            sessions,
            done: done_rx.clone(),
        });
        if let Some(other) = displaced {
            other.stop();
        }

        match settled_rx.await {
            Ok(()) => Ok(()),
            // The run ended before both artifacts reported
            Err(_) => finish(&core, done_rx).await,
        }
    }

    /// Stop the run: cancel the pending restart, close both watches and ask
    /// the child to terminate. Returns without waiting for any of it.
    pub fn stop(&self) {
        if let Some(run) = lock(&self.active).as_ref() {
            run.stop();
        }
    }

    /// Wait for the current run to end.
    ///
    /// `Ok(())` after `stop()`. A fatal error is handed to the first caller
    /// only. Resolves immediately when nothing was ever run.
    pub async fn wait(&self) -> Result<()> {
        let run = lock(&self.active)
            .as_ref()
            .map(|run| (run.core.clone(), run.done.clone()));
        match run {
            Some((core, done)) => finish(&core, done).await,
            None => Ok(()),
        }
    }
}

async fn finish(core: &Mutex<RunCore>, mut done: watch::Receiver<bool>) -> Result<()> {
    if done.wait_for(|finished| *finished).await.is_err() {
        tracing::warn!("Run loop ended without reporting");
    }
    match lock(core).take_fatal() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
