//! Task status updater.
//!
//! Runs once per finished worker: gathers evidence from its transcript,
//! detects crashes, scores tests, verifies new tests against a diff and merges
//! the result into the shared state in one guarded update.

use crate::errors::StoreError;
use crate::evidence::{
    NewTestVerdict, TestVerdict, locate_task_id, score_test_output, verify_new_tests,
};
use crate::state::{StateStore, TaskGraph, TaskStatus};
use crate::tracker::{GitTracker, ScopedDiff};
use crate::transcript::{
    TestRunnerCatalogue, Transcript, extract_files_modified, extract_test_output, extract_text,
};

/// Reason recorded on tasks failed by crash detection.
pub const AGENT_CRASH: &str = "agent_crash";

/// Source of the diff used for new-test verification.
pub trait DiffProvider {
    fn task_diff(&self, start_sha: Option<&str>, files: &[String]) -> Option<ScopedDiff>;
}

impl DiffProvider for GitTracker {
    fn task_diff(&self, start_sha: Option<&str>, files: &[String]) -> Option<ScopedDiff> {
        GitTracker::task_diff(self, start_sha, files)
    }
}

/// Facts derived from one transcript, before any state is consulted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerEvidence {
    pub task_id: Option<String>,
    pub files_modified: Vec<String>,
    pub tests: TestVerdict,
}

impl WorkerEvidence {
    pub fn gather(transcript: &Transcript, catalogue: &TestRunnerCatalogue) -> Self {
        let text = extract_text(transcript);
        Self {
            task_id: locate_task_id(&text),
            files_modified: extract_files_modified(transcript),
            tests: score_test_output(&extract_test_output(transcript, catalogue)),
        }
    }
}

/// What the updater did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Evidence merged and the task marked implemented
    Implemented {
        task_id: String,
        wave: u32,
        /// Every task in the wave is now implemented or completed
        wave_complete: bool,
    },
    /// The task was already implemented or completed; nothing changed
    AlreadyRecorded { task_id: String },
    /// No task identity recovered; these executing tasks were failed
    Crashed { failed: Vec<String> },
    /// The transcript names a task the workflow does not have
    UnknownTask { task_id: String },
    /// The named task was never dispatched; evidence refused
    NotDispatched { task_id: String, status: TaskStatus },
    /// No task identity and nothing executing
    NothingExecuting,
}

/// Merge evidence into the graph. Pure; the caller provides the lock.
pub fn apply_evidence(
    graph: &mut TaskGraph,
    evidence: &WorkerEvidence,
    new_tests: Option<&NewTestVerdict>,
) -> UpdateOutcome {
    let Some(task_id) = evidence.task_id.as_deref() else {
        return fail_executing(graph);
    };

    let is_executing = graph.executing_tasks.contains(task_id);
    let Some(task) = graph.task_mut(task_id) else {
        return UpdateOutcome::UnknownTask {
            task_id: task_id.to_string(),
        };
    };

    if task.status.is_done() {
        return UpdateOutcome::AlreadyRecorded {
            task_id: task_id.to_string(),
        };
    }

    // Evidence only lands on work a dispatch admitted
    if task.status != TaskStatus::InProgress && !is_executing {
        return UpdateOutcome::NotDispatched {
            task_id: task_id.to_string(),
            status: task.status,
        };
    }

    task.status = TaskStatus::Implemented;
    task.failure_reason = None;
    task.tests_passed = evidence.tests.passed;
    task.test_evidence = evidence.tests.evidence.clone();
    task.files_modified = evidence.files_modified.clone();
    if task.new_tests_required {
        let verdict = new_tests.cloned().unwrap_or_else(|| verify_new_tests(""));
        task.new_tests_written = verdict.written;
        task.new_test_evidence = verdict.evidence;
    } else {
        task.new_tests_written = false;
        task.new_test_evidence = "not required for this task".to_string();
    }
    let wave = task.wave;

    graph.executing_tasks.remove(task_id);

    let wave_complete = graph.wave_implemented(wave);
    if wave_complete {
        graph.gate_mut(wave).impl_complete = true;
    }

    UpdateOutcome::Implemented {
        task_id: task_id.to_string(),
        wave,
        wave_complete,
    }
}

fn fail_executing(graph: &mut TaskGraph) -> UpdateOutcome {
    if graph.executing_tasks.is_empty() {
        return UpdateOutcome::NothingExecuting;
    }

    let failed: Vec<String> = std::mem::take(&mut graph.executing_tasks)
        .into_iter()
        .collect();
    for id in &failed {
        if let Some(task) = graph.task_mut(id) {
            task.status = TaskStatus::Failed;
            task.failure_reason = Some(AGENT_CRASH.to_string());
            task.retry_count += 1;
        }
    }
    UpdateOutcome::Crashed { failed }
}

/// Record one finished worker's transcript in the store.
///
/// The diff is computed from a snapshot before the lock is taken; only the
/// merge itself runs under the lock.
pub fn record_completion(
    store: &StateStore,
    transcript: &Transcript,
    catalogue: &TestRunnerCatalogue,
    diffs: Option<&dyn DiffProvider>,
) -> Result<UpdateOutcome, StoreError> {
    let evidence = WorkerEvidence::gather(transcript, catalogue);

    let snapshot = store.load()?.ok_or_else(|| StoreError::NoActiveWorkflow {
        path: store.path().to_path_buf(),
    })?;

    let new_tests = evidence
        .task_id
        .as_deref()
        .and_then(|id| snapshot.task(id))
        .filter(|task| task.new_tests_required && !task.status.is_done())
        .map(|task| match diffs.and_then(|d| d.task_diff(task.start_sha.as_deref(), &evidence.files_modified)) {
            Some(diff) => {
                let mut verdict = verify_new_tests(&diff.text);
                verdict.evidence = format!("{} ({})", verdict.evidence, diff.source);
                verdict
            }
            None => verify_new_tests(""),
        });

    let (_, outcome) = store.update_with(|graph| apply_evidence(graph, &evidence, new_tests.as_ref()))?;

    match &outcome {
        UpdateOutcome::Implemented {
            task_id,
            wave,
            wave_complete,
        } => {
            tracing::info!(task_id = %task_id, wave, tests_passed = evidence.tests.passed, wave_complete, "task implemented");
        }
        UpdateOutcome::AlreadyRecorded { task_id } => {
            tracing::debug!(task_id = %task_id, "completion already recorded");
        }
        UpdateOutcome::Crashed { failed } => {
            tracing::warn!(tasks = ?failed, reason = AGENT_CRASH, "worker finished without a task id; failed executing tasks");
        }
        UpdateOutcome::UnknownTask { task_id } => {
            tracing::warn!(task_id = %task_id, "transcript names a task that is not in the workflow");
        }
        UpdateOutcome::NotDispatched { task_id, status } => {
            tracing::warn!(task_id = %task_id, status = %status, "transcript names a task that was never dispatched; evidence refused");
        }
        UpdateOutcome::NothingExecuting => {
            tracing::debug!("worker finished without a task id and nothing was executing");
        }
    }

    Ok(outcome)
}
