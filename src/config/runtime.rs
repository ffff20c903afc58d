//! Supervised runtime settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::supervisor::LaunchSpec;

/// The long-lived process kept in sync with the builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Executable to launch (path or name looked up on PATH).
    pub executable: String,

    /// Leading arguments; extra launch args are appended after these.
    pub args: Vec<String>,

    /// Working directory for the child (defaults to the current directory).
    pub cwd: Option<PathBuf>,

    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            executable: "electron".to_string(),
            args: vec!["--inspect=5858".to_string(), "dist/electron-main.cjs".to_string()],
            cwd: None,
            env: BTreeMap::new(),
        }
    }
}

impl RuntimeConfig {
    /// Build the launch spec used for every (re)start.
    pub fn launch_spec(&self) -> LaunchSpec {
        let mut spec = LaunchSpec::new(&self.executable).args(self.args.iter().cloned());
        if let Some(cwd) = &self.cwd {
            spec = spec.cwd(cwd.clone());
        }
        for (key, value) in &self.env {
            spec = spec.env(key, value);
        }
        spec
    }
}
