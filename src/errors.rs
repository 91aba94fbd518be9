//! Typed error hierarchy for the conductor.
//!
//! Three top-level enums cover the subsystems that may fail hard:
//! - `StoreError`: shared state file locking and persistence
//! - `GuardViolation`: admission checks refused an action
//! - `TaskListError`: a decomposed task list breaks the wave ordering rules
//!
//! Everything else (evidence extraction, transition resolution, gate
//! evaluation) reports negative outcomes as values, not errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the shared state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(
        "Could not acquire state lock {path} after {attempts} attempts; another conductor process \
         is holding it. Retry the command, or remove the lock file if no conductor process is running"
    )]
    LockTimeout { path: PathBuf, attempts: u32 },

    #[error(
        "No active workflow: {path} does not exist. Run 'conductor start <feature>' before mutating state"
    )]
    NoActiveWorkflow { path: PathBuf },

    #[error(
        "A workflow is already active at {path}. Run 'conductor abort' first or pass --force to replace it"
    )]
    AlreadyActive { path: PathBuf },

    #[error("Failed to read state file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file at {path} is not a valid task graph: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write state file at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Refused to persist state: executing tasks {} are not in progress. The change was discarded",
        tasks.join(", ")
    )]
    Inconsistent { tasks: Vec<String> },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// An ordering guard refused an action.
///
/// Each variant names the invariant that was violated; `remedy()` tells the
/// caller what to do instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardViolation {
    #[error("Direct edit of {path} refused while a workflow is active")]
    DirectEdit { path: String },

    #[error("Direct write to the shared state file refused: {command}")]
    StateFileWrite { command: String },

    #[error("Task {task_id} is not part of the workflow")]
    UnknownTask { task_id: String },

    #[error("Task {task_id} belongs to wave {task_wave}, but the current wave is {current_wave}")]
    WrongWave {
        task_id: String,
        task_wave: u32,
        current_wave: u32,
    },

    #[error("Task {task_id} has unfinished dependencies: {}", pending.join(", "))]
    DependenciesIncomplete {
        task_id: String,
        pending: Vec<String>,
    },

    #[error("Task {task_id} is already {status} and cannot be dispatched again")]
    AlreadyDispatched { task_id: String, status: String },

    #[error("Workers can only be dispatched in the execute phase (current phase: {phase})")]
    NotExecuting { phase: String },

    #[error("Dispatch for role '{role}' declares model '{declared}', but the role requires '{required}'")]
    ModelMismatch {
        role: String,
        declared: String,
        required: String,
    },

    #[error("Dispatch for role '{role}' omits its required model declaration ('{required}')")]
    MissingModel { role: String, required: String },

    #[error("Worker dispatch for role '{role}' names no task during the execute phase")]
    MissingTaskId { role: String },
}

impl GuardViolation {
    /// The remedial action a caller must take.
    pub fn remedy(&self) -> &'static str {
        match self {
            Self::DirectEdit { .. } => {
                "Dispatch a worker for the current wave; file changes must go through the worker path, not a direct edit"
            }
            Self::StateFileWrite { .. } => {
                "Use the conductor commands (which lock and write atomically) instead of writing the state file"
            }
            Self::UnknownTask { .. } => "Check the task id with 'conductor status'",
            Self::WrongWave { .. } => {
                "Dispatch tasks from the current wave, or run 'conductor wave advance' once it passes its gate"
            }
            Self::DependenciesIncomplete { .. } => {
                "Wait for the dependencies to finish, then dispatch again"
            }
            Self::AlreadyDispatched { .. } => {
                "Wait for the running worker to report, or let crash detection fail it before retrying"
            }
            Self::NotExecuting { .. } => {
                "Finish the planning phases with 'conductor complete-phase' before dispatching workers"
            }
            Self::ModelMismatch { .. } | Self::MissingModel { .. } => {
                "Dispatch with the model declared for this role in .conductor/config.toml"
            }
            Self::MissingTaskId { .. } => {
                "Put 'TASK_ID: <id>' for a current-wave task in the worker prompt"
            }
        }
    }

    /// Full human-readable refusal: what was violated and what to do instead.
    pub fn explain(&self) -> String {
        format!("{}. {}.", self, self.remedy())
    }
}

/// Errors from validating a decomposed task list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskListError {
    #[error("Task list is empty")]
    Empty,

    #[error("Duplicate task id {id}")]
    DuplicateId { id: String },

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("Task {task} depends on itself")]
    SelfDependency { task: String },

    #[error(
        "Task {task} (wave {task_wave}) depends on {dependency} from later wave {dependency_wave}"
    )]
    ForwardDependency {
        task: String,
        task_wave: u32,
        dependency: String,
        dependency_wave: u32,
    },

    #[error("Dependency cycle detected in wave {wave} involving: {}", tasks.join(", "))]
    Cycle { wave: u32, tasks: Vec<String> },
}
