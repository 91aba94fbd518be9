//! Evidence extraction passes over a parsed transcript.
//!
//! Four independent, pure passes:
//! - [`extract_text`]: every human-readable fragment, for regex scanning
//! - [`extract_files_modified`]: paths touched by file-mutating tools
//! - [`extract_test_output`]: output of recognised test-runner commands only
//! - [`extract_phase_artifacts`]: spec/plan documents the worker created

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use super::{ContentBlock, Transcript};
use crate::phase::{ArtifactKind, ArtifactLayout};

/// Tools whose `file_path` (or `notebook_path`) is mutated.
const FILE_MUTATING_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];

/// Tools that create a file from scratch.
const FILE_CREATING_TOOLS: &[&str] = &["Write"];

/// Conventional test-runner invocations across ecosystems.
const BUILTIN_RUNNER_PATTERNS: &[&str] = &[
    // JavaScript / TypeScript
    r"\b(?:npm|pnpm|yarn|bun)\s+(?:run\s+)?test\b",
    r"(?:^|&&|;|\|\|)\s*(?:npx\s+)?(?:jest|vitest|mocha)\b",
    r"\bnpx\s+(?:jest|vitest|mocha|playwright\s+test)\b",
    // Python
    r"\b(?:python3?\s+-m\s+)?pytest\b",
    r"\bpython3?\s+-m\s+unittest\b",
    // Rust
    r"\bcargo\s+(?:test|nextest)\b",
    // Go
    r"\bgo\s+test\b",
    // JVM
    r"\b(?:mvn|mvnw)\b.*\b(?:test|verify)\b",
    r"\b(?:gradle|gradlew)\b.*\btest\b",
    // Ruby
    r"\b(?:bundle\s+exec\s+)?rspec\b",
    // .NET
    r"\bdotnet\s+test\b",
    // PHP / Elixir
    r"\bphpunit\b",
    r"\bmix\s+test\b",
];

static BUILTIN_RUNNERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    BUILTIN_RUNNER_PATTERNS
        .iter()
        .map(|p| Regex::new(p).expect("built-in runner pattern is valid"))
        .collect()
});

/// The set of commands recognised as test-runner invocations.
#[derive(Debug, Clone, Default)]
pub struct TestRunnerCatalogue {
    extra: Vec<Regex>,
}

impl TestRunnerCatalogue {
    /// Only the built-in runners.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Built-in runners plus configured extra patterns.
    pub fn with_extra(patterns: &[String]) -> Result<Self> {
        let extra = patterns
            .iter()
            .map(|p| {
                Regex::new(p).with_context(|| format!("Invalid test runner pattern '{}'", p))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { extra })
    }

    pub fn is_test_command(&self, command: &str) -> bool {
        BUILTIN_RUNNERS
            .iter()
            .chain(self.extra.iter())
            .any(|re| re.is_match(command))
    }
}

/// Concatenate message text and textual tool results in document order.
pub fn extract_text(transcript: &Transcript) -> String {
    transcript
        .blocks()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::ToolResult { content, .. } => Some(content.as_str()),
            ContentBlock::ToolUse { .. } => None,
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn tool_uses<'a>(
    transcript: &'a Transcript,
    tools: &'a [&'a str],
) -> impl Iterator<Item = (&'a str, &'a serde_json::Value)> + 'a {
    transcript.blocks().filter_map(move |block| match block {
        ContentBlock::ToolUse { name, input, .. } if tools.contains(&name.as_str()) => {
            Some((name.as_str(), input))
        }
        _ => None,
    })
}

fn target_path(input: &serde_json::Value) -> Option<&str> {
    input
        .get("file_path")
        .or_else(|| input.get("notebook_path"))
        .and_then(|v| v.as_str())
        .filter(|p| !p.is_empty())
}

/// Paths of every file-mutating tool call, de-duplicated and sorted.
pub fn extract_files_modified(transcript: &Transcript) -> Vec<String> {
    tool_uses(transcript, FILE_MUTATING_TOOLS)
        .filter_map(|(_, input)| target_path(input))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Output of recognised test-runner commands, and nothing else.
pub fn extract_test_output(transcript: &Transcript, catalogue: &TestRunnerCatalogue) -> String {
    let test_call_ids: HashSet<&str> = transcript
        .blocks()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } if name == "Bash" && !id.is_empty() => {
                let command = input.get("command").and_then(|c| c.as_str())?;
                catalogue.is_test_command(command).then_some(id.as_str())
            }
            _ => None,
        })
        .collect();

    if test_call_ids.is_empty() {
        return String::new();
    }

    transcript
        .blocks()
        .filter_map(|block| match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } if test_call_ids.contains(tool_use_id.as_str()) => Some(content.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Spec and plan documents a worker created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseArtifacts {
    pub spec: Option<String>,
    pub plan: Option<String>,
}

impl PhaseArtifacts {
    pub fn for_kind(&self, kind: ArtifactKind) -> Option<&str> {
        match kind {
            ArtifactKind::Spec => self.spec.as_deref(),
            ArtifactKind::Plan => self.plan.as_deref(),
        }
    }

    fn slot(&mut self, kind: ArtifactKind) -> &mut Option<String> {
        match kind {
            ArtifactKind::Spec => &mut self.spec,
            ArtifactKind::Plan => &mut self.plan,
        }
    }
}

/// Find created documents under the specs/plans directories.
///
/// When several candidates share a kind, the longest path wins (deeper
/// directories are the more specific artifact). Distinct candidates tied at
/// the longest length leave the kind empty, so the phase does not advance
/// on a guess.
pub fn extract_phase_artifacts(transcript: &Transcript, layout: &ArtifactLayout) -> PhaseArtifacts {
    let mut artifacts = PhaseArtifacts::default();
    let mut tied: HashSet<ArtifactKind> = HashSet::new();

    for (_, input) in tool_uses(transcript, FILE_CREATING_TOOLS) {
        let Some(path) = target_path(input) else {
            continue;
        };
        let Some(kind) = layout.classify(path) else {
            continue;
        };

        let slot = artifacts.slot(kind);
        match slot {
            Some(current) if current.len() > path.len() => {}
            Some(current) if current.len() == path.len() => {
                if current != path {
                    tied.insert(kind);
                }
            }
            _ => {
                *slot = Some(path.to_string());
                tied.remove(&kind);
            }
        }
    }

    for kind in tied {
        if let Some(dropped) = artifacts.slot(kind).take() {
            tracing::warn!(kind = %kind, candidate = %dropped, "artifact candidates tied at equal length; none chosen");
        }
    }

    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn line(value: serde_json::Value) -> String {
        value.to_string()
    }

    fn tool_use(id: &str, name: &str, input: serde_json::Value) -> String {
        line(json!({
            "type": "assistant",
            "message": {"content": [{"type": "tool_use", "id": id, "name": name, "input": input}]}
        }))
    }

    fn tool_result(id: &str, content: &str) -> String {
        line(json!({
            "type": "user",
            "message": {"content": [{"type": "tool_result", "tool_use_id": id, "content": content}]}
        }))
    }

    fn text(t: &str) -> String {
        line(json!({"type": "assistant", "message": {"content": [{"type": "text", "text": t}]}}))
    }

    fn transcript(lines: &[String]) -> Transcript {
        Transcript::parse(&lines.join("\n"))
    }

    #[test]
    fn test_extract_text_in_document_order() {
        let t = transcript(&[
            text("Starting TASK_ID: T001"),
            tool_use("a", "Bash", json!({"command": "ls"})),
            tool_result("a", "src tests"),
            text("Done"),
        ]);
        assert_eq!(extract_text(&t), "Starting TASK_ID: T001\nsrc tests\nDone");
    }

    #[test]
    fn test_files_modified_deduped_and_sorted() {
        let t = transcript(&[
            tool_use("1", "Edit", json!({"file_path": "/r/src/b.rs"})),
            tool_use("2", "Write", json!({"file_path": "/r/src/a.rs"})),
            tool_use("3", "Read", json!({"file_path": "/r/src/c.rs"})),
            tool_use("4", "Edit", json!({"file_path": "/r/src/b.rs"})),
            tool_use("5", "NotebookEdit", json!({"notebook_path": "/r/nb.ipynb"})),
        ]);
        assert_eq!(
            extract_files_modified(&t),
            vec!["/r/nb.ipynb", "/r/src/a.rs", "/r/src/b.rs"]
        );
    }

    #[test]
    fn test_catalogue_recognises_common_runners() {
        let c = TestRunnerCatalogue::builtin();
        for cmd in [
            "npm test",
            "pnpm run test -- --watch=false",
            "cd web && npx vitest run",
            "python -m pytest tests/ -q",
            "pytest",
            "cargo test --workspace",
            "go test ./...",
            "mvn -q test",
            "./gradlew test",
            "bundle exec rspec spec/models",
            "dotnet test",
        ] {
            assert!(c.is_test_command(cmd), "expected runner: {cmd}");
        }
        for cmd in ["ls -la", "cat jest.config.js", "cargo build", "git status"] {
            assert!(!c.is_test_command(cmd), "unexpected runner: {cmd}");
        }
    }

    #[test]
    fn test_catalogue_extra_patterns() {
        let c = TestRunnerCatalogue::with_extra(&[r"\bbazel\s+test\b".to_string()]).unwrap();
        assert!(c.is_test_command("bazel test //..."));
        assert!(TestRunnerCatalogue::with_extra(&["(".to_string()]).is_err());
    }

    #[test]
    fn test_test_output_scoped_to_runner_calls() {
        let t = transcript(&[
            tool_use("ls", "Bash", json!({"command": "ls tests"})),
            tool_result("ls", "12 passing.txt"),
            tool_use("run", "Bash", json!({"command": "npx mocha"})),
            tool_result("run", "  4 passing (20ms)"),
        ]);
        let output = extract_test_output(&t, &TestRunnerCatalogue::builtin());
        assert_eq!(output, "  4 passing (20ms)");
    }

    #[test]
    fn test_test_output_empty_without_runner() {
        let t = transcript(&[
            tool_use("x", "Bash", json!({"command": "echo 10 passed"})),
            tool_result("x", "10 passed"),
        ]);
        assert!(extract_test_output(&t, &TestRunnerCatalogue::builtin()).is_empty());
    }

    #[test]
    fn test_phase_artifacts_prefers_longest_path() {
        let t = transcript(&[
            tool_use("1", "Write", json!({"file_path": "/r/specs/spec.md"})),
            tool_use("2", "Write", json!({"file_path": "/r/specs/004-auth/spec.md"})),
            tool_use("3", "Write", json!({"file_path": "/r/plans/004-auth/plan.md"})),
            tool_use("4", "Edit", json!({"file_path": "/r/plans/004-auth/detailed/plan.md"})),
            tool_use("5", "Write", json!({"file_path": "/r/src/specs.rs"})),
        ]);
        let artifacts = extract_phase_artifacts(&t, &ArtifactLayout::default());
        assert_eq!(artifacts.spec.as_deref(), Some("/r/specs/004-auth/spec.md"));
        // Edits are not creations
        assert_eq!(artifacts.plan.as_deref(), Some("/r/plans/004-auth/plan.md"));
    }

    #[test]
    fn test_phase_artifacts_equal_length_tie_picks_nothing() {
        let t = transcript(&[
            tool_use("1", "Write", json!({"file_path": "/r/specs/a/spec.md"})),
            tool_use("2", "Write", json!({"file_path": "/r/specs/b/spec.md"})),
            // Rewriting the same file is not a tie
            tool_use("3", "Write", json!({"file_path": "/r/plans/a/plan.md"})),
            tool_use("4", "Write", json!({"file_path": "/r/plans/a/plan.md"})),
        ]);
        let artifacts = extract_phase_artifacts(&t, &ArtifactLayout::default());
        assert_eq!(artifacts.for_kind(ArtifactKind::Spec), None);
        assert_eq!(artifacts.for_kind(ArtifactKind::Plan), Some("/r/plans/a/plan.md"));
    }

    #[test]
    fn test_phase_artifacts_longer_candidate_breaks_tie() {
        let t = transcript(&[
            tool_use("1", "Write", json!({"file_path": "/r/specs/a/spec.md"})),
            tool_use("2", "Write", json!({"file_path": "/r/specs/b/spec.md"})),
            tool_use("3", "Write", json!({"file_path": "/r/specs/auth/spec.md"})),
        ]);
        let artifacts = extract_phase_artifacts(&t, &ArtifactLayout::default());
        assert_eq!(artifacts.spec.as_deref(), Some("/r/specs/auth/spec.md"));
    }

    #[test]
    fn test_passes_survive_corrupt_lines() {
        let lines = vec![
            "garbage {".to_string(),
            tool_use("1", "Write", json!({"file_path": "/r/src/lib.rs"})),
            "\u{0}\u{1}".to_string(),
            tool_use("2", "Bash", json!({"command": "cargo test"})),
            tool_result("2", "test result: ok. 3 passed; 0 failed"),
        ];
        let t = transcript(&lines);
        assert_eq!(extract_files_modified(&t), vec!["/r/src/lib.rs"]);
        assert!(extract_test_output(&t, &TestRunnerCatalogue::builtin()).contains("3 passed"));
    }
}
