//! Launch description for the supervised executable.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Everything needed to spawn the supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Executable path or name
    pub executable: String,
    /// Fixed leading arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Environment variables to set
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    /// Create a new spec for the given executable
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Append fixed arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Full argument list for one launch: fixed args, then the extra ones.
    pub fn argv(&self, extra_args: &[String]) -> Vec<String> {
        self.args.iter().chain(extra_args.iter()).cloned().collect()
    }

    pub(crate) fn command(&self, extra_args: &[String]) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(self.argv(extra_args));

        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        // The runtime talks to the developer directly
        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}
