//! The task graph: the single shared record of a workflow run.
//!
//! Evidence fields on [`Task`] and the flags on [`WaveGate`] are written only
//! by the task status updater and the wave gate evaluator, never by workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::phase::Phase;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created during decomposition, not yet dispatched
    #[default]
    Pending,
    /// A worker is running it
    InProgress,
    /// The worker reported completion; waiting on the wave gate
    Implemented,
    /// Its wave passed the gate
    Completed,
    /// The worker crashed without identifying itself
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Implemented => "implemented",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Implemented or completed: the worker's part is done.
    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Implemented | TaskStatus::Completed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the external review for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Not reviewed yet
    #[default]
    Pending,
    /// Reviewed, no critical findings
    Passed,
    /// Reviewed, critical findings recorded
    Blocked,
    /// A review ran but its output carried no recognisable findings markers
    EvidenceCaptureFailed,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Passed => "passed",
            ReviewStatus::Blocked => "blocked",
            ReviewStatus::EvidenceCaptureFailed => "evidence_capture_failed",
        };
        f.write_str(s)
    }
}

/// One unit of dispatched work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique, stable identifier (e.g. "T001")
    pub id: String,
    pub description: String,
    /// Worker role that runs this task
    pub agent: String,
    /// Wave number; waves need not be contiguous
    pub wave: u32,
    #[serde(default)]
    pub status: TaskStatus,
    /// Tasks in earlier or equal waves this one waits for
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    #[serde(default)]
    pub tests_passed: bool,
    /// Which framework signature justified `tests_passed`
    #[serde(default)]
    pub test_evidence: String,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default = "default_true")]
    pub new_tests_required: bool,
    #[serde(default)]
    pub new_tests_written: bool,
    #[serde(default)]
    pub new_test_evidence: String,
    #[serde(default)]
    pub review_status: ReviewStatus,
    #[serde(default)]
    pub critical_findings: Vec<String>,
    #[serde(default)]
    pub advisory_findings: Vec<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// HEAD before the task began; scopes new-test diffs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_sha: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Task {
    /// Create a pending task with no evidence.
    pub fn new(id: &str, description: &str, agent: &str, wave: u32) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            agent: agent.to_string(),
            wave,
            status: TaskStatus::Pending,
            depends_on: BTreeSet::new(),
            tests_passed: false,
            test_evidence: String::new(),
            files_modified: Vec::new(),
            new_tests_required: true,
            new_tests_written: false,
            new_test_evidence: String::new(),
            review_status: ReviewStatus::Pending,
            critical_findings: Vec::new(),
            advisory_findings: Vec::new(),
            retry_count: 0,
            failure_reason: None,
            start_sha: None,
        }
    }

    /// Set the dependencies.
    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Declare whether this task must add new tests.
    pub fn with_new_tests_required(mut self, required: bool) -> Self {
        self.new_tests_required = required;
        self
    }
}

/// Test evidence verdict for a wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TestsState {
    Pass,
    Fail,
    /// The gate has not been evaluated yet
    #[default]
    Unknown,
}

/// Per-wave gate flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveGate {
    #[serde(default)]
    pub impl_complete: bool,
    #[serde(default)]
    pub tests_passed: TestsState,
    #[serde(default)]
    pub reviews_complete: bool,
    #[serde(default)]
    pub blocked: bool,
}

/// Verdict token emitted by the spec-check collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpecVerdict {
    Pass,
    Warn,
    Fail,
    #[default]
    Unknown,
}

impl fmt::Display for SpecVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpecVerdict::Pass => "PASS",
            SpecVerdict::Warn => "WARN",
            SpecVerdict::Fail => "FAIL",
            SpecVerdict::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Result of one specification alignment check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecCheck {
    pub wave: u32,
    pub run_at: DateTime<Utc>,
    pub critical_count: u32,
    pub high_count: u32,
    #[serde(default)]
    pub critical_findings: Vec<String>,
    #[serde(default)]
    pub high_findings: Vec<String>,
    #[serde(default)]
    pub medium_findings: Vec<String>,
    #[serde(default)]
    pub verdict: SpecVerdict,
}

/// The root aggregate of one workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub run_id: Uuid,
    /// Short feature name the run was started for
    pub feature: String,
    pub current_phase: Phase,
    /// Artifact produced by each completed phase
    #[serde(default)]
    pub phase_artifacts: BTreeMap<Phase, PathBuf>,
    #[serde(default)]
    pub skipped_phases: BTreeSet<Phase>,
    #[serde(default)]
    pub current_wave: u32,
    /// Tasks in decomposition order
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Ids of tasks a worker is currently running
    #[serde(default)]
    pub executing_tasks: BTreeSet<String>,
    #[serde(default)]
    pub wave_gates: BTreeMap<u32, WaveGate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_check: Option<SpecCheck>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the last wave passes its gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskGraph {
    /// Start a new run at the explore phase.
    pub fn new(feature: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            feature: feature.to_string(),
            current_phase: Phase::Explore,
            phase_artifacts: BTreeMap::new(),
            skipped_phases: BTreeSet::new(),
            current_wave: 0,
            tasks: Vec::new(),
            executing_tasks: BTreeSet::new(),
            wave_gates: BTreeMap::new(),
            spec_check: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// A run is active until its final wave passes.
    pub fn is_active(&self) -> bool {
        self.completed_at.is_none()
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Tasks assigned to a wave, in decomposition order.
    pub fn tasks_in_wave(&self, wave: u32) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| t.wave == wave)
    }

    /// Distinct wave numbers declared by the tasks.
    pub fn wave_numbers(&self) -> BTreeSet<u32> {
        self.tasks.iter().map(|t| t.wave).collect()
    }

    /// Gate flags for a wave, created on first access.
    pub fn gate_mut(&mut self, wave: u32) -> &mut WaveGate {
        self.wave_gates.entry(wave).or_default()
    }

    /// Every task in the wave is implemented or completed.
    pub fn wave_implemented(&self, wave: u32) -> bool {
        let mut tasks = self.tasks_in_wave(wave).peekable();
        tasks.peek().is_some() && tasks.all(|t| t.status.is_done())
    }

    /// Executing ids whose task is missing or not in progress.
    pub fn stray_executing(&self) -> Vec<String> {
        self.executing_tasks
            .iter()
            .filter(|id| {
                !self
                    .task(id)
                    .is_some_and(|t| t.status == TaskStatus::InProgress)
            })
            .cloned()
            .collect()
    }

    /// `executing_tasks` only names tasks that are in progress.
    pub fn executing_is_consistent(&self) -> bool {
        self.stray_executing().is_empty()
    }
}
