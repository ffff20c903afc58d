//! Configuration system for relaunch.
//!
//! Loaded from, in order:
//! 1. Explicit path if provided
//! 2. relaunch.yml in the current directory (project config)
//! 3. ~/.config/relaunch/relaunch.yml (user config)
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::ArtifactKind;
use crate::error::{RelaunchError, Result};
use crate::watch::LineClassifier;

pub use self::artifact::{ArtifactConfig, ArtifactsConfig};
pub use self::runtime::RuntimeConfig;

mod artifact;
mod runtime;

/// Default restart debounce.
pub const DEFAULT_QUIET_PERIOD_MS: u64 = 1000;

/// Default delay between the polite termination signal and a forced kill.
pub const DEFAULT_KILL_GRACE_MS: u64 = 5000;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run identity; re-running with the same target is a no-op.
    pub target: String,
    pub quiet_period_ms: u64,
    pub kill_grace_ms: u64,
    pub runtime: RuntimeConfig,
    pub artifacts: ArtifactsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: "http://localhost:8080".to_string(),
            quiet_period_ms: DEFAULT_QUIET_PERIOD_MS,
            kill_grace_ms: DEFAULT_KILL_GRACE_MS,
            runtime: RuntimeConfig::default(),
            artifacts: ArtifactsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path takes precedence, and failing it is an error
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let project_name = env!("CARGO_PKG_NAME");

        let project_config = PathBuf::from(format!("{}.yml", project_name));
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", project_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            RelaunchError::Config(format!("failed to read {}: {}", path.as_ref().display(), e))
        })?;
        let config: Self = serde_yaml::from_str(&content)?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.executable.trim().is_empty() {
            return Err(RelaunchError::Config("runtime.executable must not be empty".into()));
        }
        if self.quiet_period_ms == 0 {
            return Err(RelaunchError::Config("quiet_period_ms must be > 0".into()));
        }
        for kind in ArtifactKind::ALL {
            let artifact = self.artifacts.get(kind);
            if artifact.command.trim().is_empty() {
                return Err(RelaunchError::Config(format!("artifacts.{}.command must not be empty", kind)));
            }
            LineClassifier::new(&artifact.success_markers, &artifact.error_markers).map_err(|e| {
                RelaunchError::Config(format!("artifacts.{}: {}", kind, e))
            })?;
        }
        Ok(())
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.quiet_period(), Duration::from_millis(1000));
        assert_eq!(config.kill_grace(), Duration::from_millis(5000));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.yml");
        fs::write(
            &path,
            r#"
target: http://localhost:9300
quiet_period_ms: 250
runtime:
  executable: /usr/bin/electron
  args: ["--inspect=5858", "dist/electron-main.cjs"]
artifacts:
  preload:
    command: npm
    args: ["run", "watch:preload"]
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.target, "http://localhost:9300");
        assert_eq!(config.quiet_period_ms, 250);
        assert_eq!(config.kill_grace_ms, DEFAULT_KILL_GRACE_MS);
        assert_eq!(config.runtime.executable, "/usr/bin/electron");
        assert_eq!(config.runtime.args.len(), 2);
        assert_eq!(config.artifacts.preload.command, "npm");
        // Untouched sections keep their defaults
        assert_eq!(config.artifacts.main, ArtifactsConfig::default().main);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.yml");
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, RelaunchError::Config(_)));
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yml");
        fs::write(&path, "quiet_period_ms: [not, a, number]").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, RelaunchError::Yaml(_)));
    }

    #[test]
    fn test_validate_rejects_empty_executable() {
        let mut config = Config::default();
        config.runtime.executable = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_quiet_period() {
        let config = Config {
            quiet_period_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_watch_command() {
        let mut config = Config::default();
        config.artifacts.preload.command = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("artifacts.preload.command"));
    }

    #[test]
    fn test_validate_rejects_bad_marker_pattern() {
        let mut config = Config::default();
        config.artifacts.main.error_markers = vec!["compiled with (".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("artifacts.main"));
    }

    #[test]
    fn test_config_yaml_roundtrip_keeps_identity() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let restored: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config, restored);
    }
}
