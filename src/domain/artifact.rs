//! Artifact identity and build outcome types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two build outputs that together make up the runnable app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Main,
    Preload,
}

impl ArtifactKind {
    /// Every tracked artifact. The fully-ready predicate is defined over this set.
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Main, ArtifactKind::Preload];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Main => "main",
            ArtifactKind::Preload => "preload",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one completed watch cycle for one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildOutcome {
    Error,
    Success,
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_kind_display() {
        assert_eq!(ArtifactKind::Main.to_string(), "main");
        assert_eq!(ArtifactKind::Preload.to_string(), "preload");
    }

    #[test]
    fn test_all_kinds_distinct() {
        assert_eq!(ArtifactKind::ALL.len(), 2);
        assert_ne!(ArtifactKind::ALL[0], ArtifactKind::ALL[1]);
    }

    #[test]
    fn test_artifact_kind_serde() {
        let yaml = serde_yaml::to_string(&ArtifactKind::Preload).unwrap();
        assert_eq!(yaml.trim(), "preload");
        let kind: ArtifactKind = serde_yaml::from_str("main").unwrap();
        assert_eq!(kind, ArtifactKind::Main);
    }

    #[test]
    fn test_build_outcome_is_success() {
        assert!(BuildOutcome::Success.is_success());
        assert!(!BuildOutcome::Error.is_success());
    }
}
