//! Per-artifact build watch settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::domain::ArtifactKind;

/// How to watch-build one artifact.
///
/// The command is expected to stay alive and rebuild on every source change.
/// Each output line is matched against the markers (regular expressions) to
/// detect the end of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// A line matching any of these ends a successful cycle.
    pub success_markers: Vec<String>,
    /// A line matching any of these ends a failed cycle. Checked first.
    pub error_markers: Vec<String>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            command: "npx".to_string(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            // webpack summary lines; warnings alone still count as a good build
            success_markers: vec![
                "compiled successfully".to_string(),
                r"compiled with \d+ warnings?".to_string(),
            ],
            error_markers: vec![r"compiled with \d+ errors?".to_string(), "Failed to compile".to_string()],
        }
    }
}

impl ArtifactConfig {
    /// Create a config for the given watch command with default markers.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// `npx webpack --watch --config <file>`
    pub fn webpack(config_file: &str) -> Self {
        Self::default()
            .arg("webpack")
            .arg("--watch")
            .arg("--config")
            .arg(config_file)
    }

    /// Add an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Replace the success markers
    pub fn success_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.success_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the error markers
    pub fn error_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.error_markers = markers.into_iter().map(Into::into).collect();
        self
    }
}

/// Watch settings for both artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub main: ArtifactConfig,
    pub preload: ArtifactConfig,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            main: ArtifactConfig::webpack("webpack.main.config.js"),
            preload: ArtifactConfig::webpack("webpack.preload.config.js"),
        }
    }
}

impl ArtifactsConfig {
    pub fn get(&self, kind: ArtifactKind) -> &ArtifactConfig {
        match kind {
            ArtifactKind::Main => &self.main,
            ArtifactKind::Preload => &self.preload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_artifacts_use_separate_configs() {
        let artifacts = ArtifactsConfig::default();
        assert!(artifacts.main.args.contains(&"webpack.main.config.js".to_string()));
        assert!(artifacts.preload.args.contains(&"webpack.preload.config.js".to_string()));
    }

    #[test]
    fn test_default_command_runs_webpack() {
        let artifacts = ArtifactsConfig::default();
        assert_eq!(artifacts.main.command, "npx");
        assert_eq!(
            artifacts.main.args,
            ["webpack", "--watch", "--config", "webpack.main.config.js"]
        );
    }

    #[test]
    fn test_custom_command_gets_no_default_args() {
        let artifacts: ArtifactsConfig = serde_yaml::from_str(
            r#"
main:
  command: vite
"#,
        )
        .unwrap();
        assert_eq!(artifacts.main.command, "vite");
        assert!(artifacts.main.args.is_empty());
        assert_eq!(artifacts.main.success_markers, ArtifactConfig::default().success_markers);
        // Untouched artifact keeps the full default
        assert_eq!(artifacts.preload, ArtifactsConfig::default().preload);
    }

    #[test]
    fn test_get_by_kind() {
        let artifacts = ArtifactsConfig {
            main: ArtifactConfig::new("build-main"),
            preload: ArtifactConfig::new("build-preload"),
        };
        assert_eq!(artifacts.get(ArtifactKind::Main).command, "build-main");
        assert_eq!(artifacts.get(ArtifactKind::Preload).command, "build-preload");
    }

    #[test]
    fn test_builder_markers() {
        let config = ArtifactConfig::new("sh")
            .arg("-c")
            .arg("echo ok")
            .success_markers(["ok"])
            .error_markers(["bad"]);
        assert_eq!(config.args, vec!["-c".to_string(), "echo ok".to_string()]);
        assert_eq!(config.success_markers, vec!["ok".to_string()]);
        assert_eq!(config.error_markers, vec!["bad".to_string()]);
    }
}
