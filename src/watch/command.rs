//! Watch-mode build command as a BuildWatcher.
//!
//! The command is expected to stay alive and print a recognisable line at the
//! end of every compile cycle, the way bundlers in watch mode do.

use async_trait::async_trait;
use regex::RegexSet;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use super::{BuildCycle, BuildWatcher, Subscription};
use crate::config::ArtifactConfig;
use crate::domain::{ArtifactKind, BuildOutcome};
use crate::error::{RelaunchError, Result};

/// Matches output lines against an artifact's cycle markers.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    success: RegexSet,
    error: RegexSet,
}

impl LineClassifier {
    /// Compile the marker patterns. Empty patterns are ignored.
    pub fn new(success_markers: &[String], error_markers: &[String]) -> std::result::Result<Self, regex::Error> {
        let compile = |markers: &[String]| RegexSet::new(markers.iter().filter(|m| !m.is_empty()));
        Ok(Self {
            success: compile(success_markers)?,
            error: compile(error_markers)?,
        })
    }

    /// Classify one output line. Error markers win.
    pub fn classify(&self, line: &str) -> Option<BuildOutcome> {
        if self.error.is_match(line) {
            Some(BuildOutcome::Error)
        } else if self.success.is_match(line) {
            Some(BuildOutcome::Success)
        } else {
            None
        }
    }
}

/// Spawns each artifact's watch command as a child process
#[derive(Debug, Default, Clone)]
pub struct CommandWatcher;

impl CommandWatcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BuildWatcher for CommandWatcher {
    async fn watch(&self, kind: ArtifactKind, config: &ArtifactConfig) -> Result<Box<dyn Subscription>> {
        let classifier = LineClassifier::new(&config.success_markers, &config.error_markers).map_err(|e| {
            RelaunchError::Watch {
                kind,
                reason: format!("invalid marker: {}", e),
            }
        })?;

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| RelaunchError::Watch {
            kind,
            reason: format!("failed to spawn {}: {}", config.command, e),
        })?;

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, line_tx));
        }

        tracing::info!(kind = %kind, command = %config.command, pid = ?child.id(), "Build watcher spawned");

        Ok(Box::new(CommandSubscription {
            kind,
            child,
            lines: line_rx,
            classifier,
        }))
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                // Build tools print whatever bytes their plugins hand them
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if tx.send(line.to_string()).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read build output");
                break;
            }
        }
    }
}

struct CommandSubscription {
    kind: ArtifactKind,
    child: Child,
    lines: mpsc::UnboundedReceiver<String>,
    classifier: LineClassifier,
}

#[async_trait]
impl Subscription for CommandSubscription {
    async fn next_cycle(&mut self) -> Option<BuildCycle> {
        while let Some(line) = self.lines.recv().await {
            tracing::debug!(kind = %self.kind, "{}", line);
            match self.classifier.classify(&line) {
                Some(BuildOutcome::Success) => return Some(BuildCycle::success()),
                Some(BuildOutcome::Error) => return Some(BuildCycle::with_errors([line])),
                None => {}
            }
        }

        // Both output streams closed: the build tool is gone
        match self.child.wait().await {
            Ok(status) => tracing::warn!(kind = %self.kind, %status, "Build watcher exited"),
            Err(e) => tracing::warn!(kind = %self.kind, error = %e, "Build watcher lost"),
        }
        None
    }

    async fn close(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            if let Err(e) = self.child.kill().await {
                tracing::warn!(kind = %self.kind, error = %e, "Failed to kill build watcher");
            }
        }
    }
}
