//! The fixed workflow phases.
//!
//! This module provides:
//! - `Phase`, the closed set of workflow stages in execution order
//! - `ArtifactKind`, the conventional document directory a phase writes into
//! - `ArtifactLayout`, where those directories live and how artifacts are named

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

use crate::config::WorkflowSection;

/// One stage of the fixed workflow.
///
/// The order is explore → specify → clarify → design → decompose → execute.
/// Clarify may be skipped when the specification has few open questions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Research the codebase and record findings
    #[default]
    Explore,
    /// Write the feature specification
    Specify,
    /// Resolve ambiguity markers left in the specification
    Clarify,
    /// Produce the technical plan
    Design,
    /// Break the plan into waves of tasks
    Decompose,
    /// Run the task waves
    Execute,
}

impl Phase {
    /// Returns all phases in workflow order.
    pub fn all() -> &'static [Phase] {
        &[
            Phase::Explore,
            Phase::Specify,
            Phase::Clarify,
            Phase::Design,
            Phase::Decompose,
            Phase::Execute,
        ]
    }

    /// Returns the phase name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Explore => "explore",
            Phase::Specify => "specify",
            Phase::Clarify => "clarify",
            Phase::Design => "design",
            Phase::Decompose => "decompose",
            Phase::Execute => "execute",
        }
    }

    /// The document directory this phase's artifact must live under, if the
    /// phase produces one.
    pub fn artifact_kind(&self) -> Option<ArtifactKind> {
        match self {
            Phase::Explore | Phase::Specify | Phase::Clarify => Some(ArtifactKind::Spec),
            Phase::Design | Phase::Decompose => Some(ArtifactKind::Plan),
            Phase::Execute => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "explore" => Ok(Phase::Explore),
            "specify" => Ok(Phase::Specify),
            "clarify" => Ok(Phase::Clarify),
            "design" | "plan" => Ok(Phase::Design),
            "decompose" | "tasks" => Ok(Phase::Decompose),
            "execute" | "implement" => Ok(Phase::Execute),
            _ => anyhow::bail!(
                "Invalid phase '{}'. Valid values: explore, specify, clarify, design, decompose, execute",
                s
            ),
        }
    }
}

/// Conventional document directories phase artifacts are written into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// The "specs" directory (exploration notes, specification)
    Spec,
    /// The "plans" directory (technical plan, task breakdown)
    Plan,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Spec => write!(f, "spec"),
            ArtifactKind::Plan => write!(f, "plan"),
        }
    }
}

/// Conventional artifact locations, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    pub specs_dir: String,
    pub plans_dir: String,
    /// Extension without the dot
    pub extension: String,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self::from_workflow(&WorkflowSection::default())
    }
}

impl ArtifactLayout {
    pub fn from_workflow(workflow: &WorkflowSection) -> Self {
        Self {
            specs_dir: workflow.specs_dir.clone(),
            plans_dir: workflow.plans_dir.clone(),
            extension: workflow.artifact_extension.clone(),
        }
    }

    pub fn dir_for(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Spec => &self.specs_dir,
            ArtifactKind::Plan => &self.plans_dir,
        }
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }

    /// Classify a path written anywhere on disk by the directory it sits in.
    ///
    /// Matches when the artifact directory appears as whole path components
    /// (so `/work/repo/specs/a/spec.md` is a spec, `/work/myspecs/a.md` is not).
    pub fn classify(&self, path: &str) -> Option<ArtifactKind> {
        let path = Path::new(path);
        if !self.has_extension(path) || escapes(path) {
            return None;
        }
        let parts = normal_components(path);
        let parents = &parts[..parts.len().saturating_sub(1)];
        [ArtifactKind::Spec, ArtifactKind::Plan]
            .into_iter()
            .find(|kind| {
                let dir = normal_components(Path::new(self.dir_for(*kind)));
                !dir.is_empty() && parents.windows(dir.len()).any(|w| w == dir.as_slice())
            })
    }

    /// Whether `path` lives under the project's artifact directory for `kind`.
    ///
    /// Absolute paths must be inside `project_root`; relative paths are taken
    /// as relative to it. Paths with `..` components never qualify.
    pub fn is_member(&self, project_root: &Path, path: &Path, kind: ArtifactKind) -> bool {
        if !self.has_extension(path) || escapes(path) {
            return false;
        }
        let relative = if path.is_absolute() {
            match path.strip_prefix(project_root) {
                Ok(rel) => rel,
                Err(_) => return false,
            }
        } else {
            path
        };
        let parts = normal_components(relative);
        let dir = normal_components(Path::new(self.dir_for(kind)));
        !dir.is_empty() && parts.len() > dir.len() && parts.starts_with(&dir)
    }
}

fn escapes(path: &Path) -> bool {
    path.components().any(|c| c == Component::ParentDir)
}

fn normal_components(path: &Path) -> Vec<&str> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_matches_workflow() {
        let names: Vec<&str> = Phase::all().iter().map(|p| p.as_str()).collect();
        assert_eq!(
            names,
            vec!["explore", "specify", "clarify", "design", "decompose", "execute"]
        );
        assert!(Phase::Explore < Phase::Execute);
    }

    #[test]
    fn test_phase_from_str_accepts_aliases() {
        assert_eq!("PLAN".parse::<Phase>().unwrap(), Phase::Design);
        assert_eq!("tasks".parse::<Phase>().unwrap(), Phase::Decompose);
        assert_eq!("Clarify".parse::<Phase>().unwrap(), Phase::Clarify);
        assert!("deploy".parse::<Phase>().is_err());
    }

    #[test]
    fn test_phase_serializes_lowercase() {
        let json = serde_json::to_string(&Phase::Decompose).unwrap();
        assert_eq!(json, "\"decompose\"");
    }

    #[test]
    fn test_classify_by_directory_component() {
        let layout = ArtifactLayout::default();
        assert_eq!(
            layout.classify("/work/repo/specs/001-auth/spec.md"),
            Some(ArtifactKind::Spec)
        );
        assert_eq!(
            layout.classify("plans/001-auth/plan.md"),
            Some(ArtifactKind::Plan)
        );
        assert_eq!(layout.classify("/work/myspecs/spec.md"), None);
        assert_eq!(layout.classify("specs/001-auth/notes.txt"), None);
        // The directory itself is not an artifact
        assert_eq!(layout.classify("specs.md"), None);
    }

    #[test]
    fn test_classify_nested_configured_dir() {
        let layout = ArtifactLayout {
            specs_dir: "docs/specs".to_string(),
            plans_dir: "docs/plans".to_string(),
            extension: "md".to_string(),
        };
        assert_eq!(
            layout.classify("/r/docs/specs/a/spec.md"),
            Some(ArtifactKind::Spec)
        );
        assert_eq!(layout.classify("/r/specs/a/spec.md"), None);
    }

    #[test]
    fn test_is_member_requires_project_prefix() {
        let layout = ArtifactLayout::default();
        let root = Path::new("/work/repo");
        assert!(layout.is_member(root, Path::new("/work/repo/specs/a/spec.md"), ArtifactKind::Spec));
        assert!(layout.is_member(root, Path::new("specs/a/spec.md"), ArtifactKind::Spec));
        assert!(!layout.is_member(root, Path::new("src/specs/a/spec.md"), ArtifactKind::Spec));
        assert!(!layout.is_member(root, Path::new("/elsewhere/specs/a/spec.md"), ArtifactKind::Spec));
        assert!(!layout.is_member(root, Path::new("specs/a/spec.md"), ArtifactKind::Plan));
    }

    #[test]
    fn test_parent_dir_components_never_qualify() {
        let layout = ArtifactLayout::default();
        let root = Path::new("/work/repo");
        assert!(!layout.is_member(root, Path::new("specs/../src/notes.md"), ArtifactKind::Spec));
        assert!(!layout.is_member(root, Path::new("specs/../../etc/x.md"), ArtifactKind::Spec));
        assert!(!layout.is_member(root, Path::new("/work/repo/specs/../../x.md"), ArtifactKind::Spec));
        assert!(!layout.is_member(root, Path::new("specs/a/../../plans/p.md"), ArtifactKind::Plan));
        assert_eq!(layout.classify("/work/repo/specs/../src/notes.md"), None);
        // Current-dir components are harmless
        assert!(layout.is_member(root, Path::new("./specs/a/spec.md"), ArtifactKind::Spec));
    }

    #[test]
    fn test_artifact_kind_per_phase() {
        assert_eq!(Phase::Specify.artifact_kind(), Some(ArtifactKind::Spec));
        assert_eq!(Phase::Design.artifact_kind(), Some(ArtifactKind::Plan));
        assert_eq!(Phase::Execute.artifact_kind(), None);
    }
}
