//! Phase transition resolver.
//!
//! Given a phase a worker claims to have finished, decide whether the workflow
//! advances and to which phase. The resolver never writes; it returns a
//! [`Transition`] the caller applies through the store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::phase::{ArtifactKind, ArtifactLayout, Phase};
use crate::state::TaskGraph;

/// Read access to phase artifact documents.
pub trait ArtifactSource {
    /// Document content, or `None` if it does not exist.
    fn read(&self, path: &Path) -> Option<String>;
}

/// Artifacts on disk; relative paths resolve against the project root.
#[derive(Debug, Clone)]
pub struct FsArtifacts {
    root: PathBuf,
}

impl FsArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactSource for FsArtifacts {
    fn read(&self, path: &Path) -> Option<String> {
        std::fs::read_to_string(self.root.join(path)).ok()
    }
}

/// In-memory artifacts keyed by path.
impl ArtifactSource for HashMap<PathBuf, String> {
    fn read(&self, path: &Path) -> Option<String> {
        self.get(path).cloned()
    }
}

/// An accepted phase change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub completed: Phase,
    pub next: Phase,
    /// Recorded as the completed phase's artifact
    pub artifact: Option<PathBuf>,
    /// A phase bypassed on the way to `next`
    pub skipped: Option<Phase>,
}

impl Transition {
    /// Record the transition in the graph.
    pub fn apply(&self, graph: &mut TaskGraph) {
        if let Some(artifact) = &self.artifact {
            graph.phase_artifacts.insert(self.completed, artifact.clone());
        }
        if let Some(skipped) = self.skipped {
            graph.skipped_phases.insert(skipped);
        }
        graph.current_phase = self.next;

        if self.next == Phase::Execute
            && graph.current_wave == 0
            && let Some(first) = graph.wave_numbers().into_iter().next()
        {
            graph.current_wave = first;
        }
    }
}

/// Outcome of resolving a completed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Advance(Transition),
    /// The phase is not actually done
    Hold(String),
}

impl Resolution {
    pub fn is_advance(&self) -> bool {
        matches!(self, Resolution::Advance(_))
    }
}

/// Phase transition rules, parameterised by the project's conventions.
pub struct PhaseResolver<'a, A: ArtifactSource> {
    pub project_root: &'a Path,
    pub layout: &'a ArtifactLayout,
    pub clarify_threshold: usize,
    pub clarification_marker: &'a str,
    pub artifacts: &'a A,
}

impl<A: ArtifactSource> PhaseResolver<'_, A> {
    /// Decide what completing `completed` means for `graph`.
    ///
    /// `candidate` is the artifact the worker produced, if one was found.
    pub fn resolve(&self, completed: Phase, graph: &TaskGraph, candidate: Option<&Path>) -> Resolution {
        if !graph.is_active() {
            return Resolution::Hold("the workflow is already complete".to_string());
        }
        if completed != graph.current_phase {
            return Resolution::Hold(format!(
                "phase '{}' is not the current phase ('{}')",
                completed, graph.current_phase
            ));
        }

        match completed {
            Phase::Explore => self
                .require_artifact(completed, candidate)
                .map_or_else(Resolution::Hold, |(path, _)| advance(completed, Phase::Specify, Some(path), None)),
            Phase::Specify => match self.require_artifact(completed, candidate) {
                Err(reason) => Resolution::Hold(reason),
                Ok((path, content)) => {
                    let markers = self.count_markers(&content);
                    if markers > self.clarify_threshold {
                        advance(completed, Phase::Clarify, Some(path), None)
                    } else {
                        advance(completed, Phase::Design, Some(path), Some(Phase::Clarify))
                    }
                }
            },
            Phase::Clarify => {
                // The clarified document is the spec itself unless a new one was written
                let candidate = candidate.or_else(|| graph.phase_artifacts.get(&Phase::Specify).map(PathBuf::as_path));
                match self.require_artifact(completed, candidate) {
                    Err(reason) => Resolution::Hold(reason),
                    Ok((path, content)) => {
                        let markers = self.count_markers(&content);
                        if markers > self.clarify_threshold {
                            Resolution::Hold(format!(
                                "{} still has {} '{}' markers (threshold {})",
                                path.display(),
                                markers,
                                self.clarification_marker,
                                self.clarify_threshold
                            ))
                        } else {
                            advance(completed, Phase::Design, Some(path), None)
                        }
                    }
                }
            }
            Phase::Design => self
                .require_artifact(completed, candidate)
                .map_or_else(Resolution::Hold, |(path, _)| advance(completed, Phase::Decompose, Some(path), None)),
            Phase::Decompose => {
                let artifact = self.require_artifact(completed, candidate).ok().map(|(path, _)| path);
                advance(completed, Phase::Execute, artifact, None)
            }
            Phase::Execute => Resolution::Hold(
                "the execute phase finishes when its last wave passes the gate; run 'conductor wave advance'"
                    .to_string(),
            ),
        }
    }

    fn count_markers(&self, content: &str) -> usize {
        if self.clarification_marker.is_empty() {
            return 0;
        }
        content.matches(self.clarification_marker).count()
    }

    /// The candidate must live under the phase's document directory and exist.
    fn require_artifact(&self, phase: Phase, candidate: Option<&Path>) -> Result<(PathBuf, String), String> {
        let kind = phase.artifact_kind().unwrap_or(ArtifactKind::Plan);
        let dir = self.layout.dir_for(kind);

        let Some(path) = candidate else {
            return Err(format!(
                "no {} artifact recorded for phase '{}'; expected a .{} document under {}/",
                kind, phase, self.layout.extension, dir
            ));
        };

        if !self.layout.is_member(self.project_root, path, kind) {
            return Err(format!(
                "{} is not a .{} document under {}/",
                path.display(),
                self.layout.extension,
                dir
            ));
        }

        let relative = path.strip_prefix(self.project_root).unwrap_or(path);
        match self.artifacts.read(relative) {
            Some(content) => Ok((relative.to_path_buf(), content)),
            None => Err(format!("artifact {} does not exist", path.display())),
        }
    }
}

fn advance(completed: Phase, next: Phase, artifact: Option<PathBuf>, skipped: Option<Phase>) -> Resolution {
    Resolution::Advance(Transition {
        completed,
        next,
        artifact,
        skipped,
    })
}
