//! Ordering guards.
//!
//! Admission checks run before a state-changing action:
//! - no direct file edits while a workflow is active
//! - no shell writes to the shared state file
//! - workers only for current-wave tasks whose dependencies are done
//! - workers only with the model configured for their role
//! - during execute, every worker dispatch names its task

use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use super::types::PreToolUsePayload;
use crate::config::AgentConfig;
use crate::dag::unsatisfied_dependencies;
use crate::errors::GuardViolation;
use crate::evidence::locate_task_id;
use crate::phase::Phase;
use crate::state::{TaskGraph, TaskStatus};

/// Tools that change files on disk.
const FILE_MUTATING_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];

/// The editor tool that starts a worker.
pub const DISPATCH_TOOL: &str = "Task";

// Shell constructs that write to a path
static SHELL_WRITE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r">|\btee\b|\bsed\s+(?:-\w*\s+)*-i|\bmv\b|\bcp\b|\brm\b|\btruncate\b|\bdd\b|\binstall\b|\bln\b")
        .unwrap()
});

/// A request to start a worker on a task.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest<'a> {
    pub task_id: &'a str,
    /// Execution role; defaults to the task's agent
    pub role: Option<&'a str>,
    /// Declared model
    pub model: Option<&'a str>,
}

/// Refuse direct edits while a workflow is active (a).
pub fn check_file_edit(graph: Option<&TaskGraph>, payload: &PreToolUsePayload) -> Result<(), GuardViolation> {
    if !FILE_MUTATING_TOOLS.contains(&payload.tool_name.as_str()) || payload.from_worker() {
        return Ok(());
    }
    match graph {
        Some(graph) if graph.is_active() => Err(GuardViolation::DirectEdit {
            path: payload.target_path().unwrap_or("<unknown>").to_string(),
        }),
        _ => Ok(()),
    }
}

/// Refuse any write to the shared state file outside the store (d).
pub fn check_state_file_write(payload: &PreToolUsePayload, state_file: &Path) -> Result<(), GuardViolation> {
    let file_name = state_file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("state.json");
    let targets_state = |s: &str| {
        let path = Path::new(s);
        path == state_file || (path.ends_with(file_name) && path.parent().is_some_and(|p| p.ends_with(".conductor")))
    };

    if FILE_MUTATING_TOOLS.contains(&payload.tool_name.as_str())
        && let Some(path) = payload.target_path()
        && targets_state(path)
    {
        return Err(GuardViolation::StateFileWrite {
            command: format!("{} {}", payload.tool_name, path),
        });
    }

    if payload.tool_name == "Bash"
        && let Some(command) = payload.command()
    {
        let state_display = state_file.to_string_lossy();
        let relative = format!(".conductor/{}", file_name);
        let mentions_state = command.contains(state_display.as_ref()) || command.contains(&relative);
        if mentions_state && SHELL_WRITE_REGEX.is_match(command) {
            return Err(GuardViolation::StateFileWrite {
                command: command.to_string(),
            });
        }
    }

    Ok(())
}

/// Admission for a worker dispatch (b, c).
pub fn check_dispatch(
    graph: &TaskGraph,
    request: &DispatchRequest<'_>,
    agents: &BTreeMap<String, AgentConfig>,
) -> Result<(), GuardViolation> {
    if graph.current_phase != Phase::Execute {
        return Err(GuardViolation::NotExecuting {
            phase: graph.current_phase.to_string(),
        });
    }

    let task = graph
        .task(request.task_id)
        .ok_or_else(|| GuardViolation::UnknownTask {
            task_id: request.task_id.to_string(),
        })?;

    if task.wave != graph.current_wave {
        return Err(GuardViolation::WrongWave {
            task_id: task.id.clone(),
            task_wave: task.wave,
            current_wave: graph.current_wave,
        });
    }

    if matches!(
        task.status,
        TaskStatus::InProgress | TaskStatus::Implemented | TaskStatus::Completed
    ) {
        return Err(GuardViolation::AlreadyDispatched {
            task_id: task.id.clone(),
            status: task.status.to_string(),
        });
    }

    let pending = unsatisfied_dependencies(graph, &task.id);
    if !pending.is_empty() {
        return Err(GuardViolation::DependenciesIncomplete {
            task_id: task.id.clone(),
            pending,
        });
    }

    let role = request.role.unwrap_or(&task.agent);
    if let Some(required) = agents.get(role).and_then(|a| a.model.as_deref()) {
        match request.model {
            None => {
                return Err(GuardViolation::MissingModel {
                    role: role.to_string(),
                    required: required.to_string(),
                });
            }
            Some(declared) if !declared.eq_ignore_ascii_case(required) => {
                return Err(GuardViolation::ModelMismatch {
                    role: role.to_string(),
                    declared: declared.to_string(),
                    required: required.to_string(),
                });
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// Check a dispatch and, when admitted, mark the task as running.
///
/// The caller holds the store lock so the check and the marking land in one
/// update.
pub fn admit_dispatch(
    graph: &mut TaskGraph,
    request: &DispatchRequest<'_>,
    agents: &BTreeMap<String, AgentConfig>,
    start_sha: Option<String>,
) -> Result<(), GuardViolation> {
    check_dispatch(graph, request, agents)?;
    graph.executing_tasks.insert(request.task_id.to_string());
    if let Some(task) = graph.task_mut(request.task_id) {
        task.status = TaskStatus::InProgress;
        task.start_sha = start_sha;
    }
    Ok(())
}

/// Whether a tool call is a worker dispatch the execute-phase guards govern.
pub fn is_governed_dispatch(graph: &TaskGraph, payload: &PreToolUsePayload) -> bool {
    payload.tool_name == DISPATCH_TOOL && graph.is_active() && graph.current_phase == Phase::Execute
}

/// Task id named in a dispatch prompt.
pub fn dispatch_task_id(payload: &PreToolUsePayload) -> Result<String, GuardViolation> {
    payload
        .prompt()
        .and_then(locate_task_id)
        .ok_or_else(|| GuardViolation::MissingTaskId {
            role: payload.subagent_type().unwrap_or("<unspecified>").to_string(),
        })
}

/// Dispatch request carried by a tool call's input.
pub fn dispatch_request<'a>(payload: &'a PreToolUsePayload, task_id: &'a str) -> DispatchRequest<'a> {
    DispatchRequest {
        task_id,
        role: payload.subagent_type(),
        model: payload.model(),
    }
}

/// Run every applicable guard for a tool call.
///
/// During execute, worker dispatches must name a task and are admitted
/// through [`check_dispatch`]; outside it dispatches pass.
pub fn check_tool_use(
    graph: Option<&TaskGraph>,
    payload: &PreToolUsePayload,
    state_file: &Path,
    agents: &BTreeMap<String, AgentConfig>,
) -> Result<(), GuardViolation> {
    check_state_file_write(payload, state_file)?;
    check_file_edit(graph, payload)?;

    if let Some(graph) = graph.filter(|g| is_governed_dispatch(g, payload)) {
        let task_id = dispatch_task_id(payload)?;
        check_dispatch(graph, &dispatch_request(payload, &task_id), agents)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Task;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> PreToolUsePayload {
        serde_json::from_value(value).unwrap()
    }

    fn execute_graph() -> TaskGraph {
        let mut graph = TaskGraph::new("f");
        graph.current_phase = Phase::Execute;
        graph.current_wave = 1;
        graph.tasks = vec![
            Task::new("T1", "a", "implementer", 1),
            Task::new("T2", "b", "implementer", 1).with_depends_on(["T1"]),
            Task::new("T3", "c", "implementer", 2),
        ];
        graph
    }

    fn agents(role: &str, model: &str) -> BTreeMap<String, AgentConfig> {
        let mut map = BTreeMap::new();
        map.insert(
            role.to_string(),
            AgentConfig {
                model: Some(model.to_string()),
            },
        );
        map
    }

    fn request(task_id: &str) -> DispatchRequest<'_> {
        DispatchRequest {
            task_id,
            role: None,
            model: None,
        }
    }

    #[test]
    fn test_direct_edit_refused_while_active() {
        let graph = execute_graph();
        let edit = payload(json!({"tool_name":"Edit","tool_input":{"file_path":"src/a.rs"}}));
        let err = check_file_edit(Some(&graph), &edit).unwrap_err();
        assert_eq!(
            err,
            GuardViolation::DirectEdit {
                path: "src/a.rs".to_string()
            }
        );
        assert!(err.explain().contains("Dispatch a worker"));

        // No workflow, or a worker making the edit
        assert!(check_file_edit(None, &edit).is_ok());
        let worker = payload(json!({"tool_name":"Edit","tool_input":{"file_path":"src/a.rs"},"agent_id":"w1"}));
        assert!(check_file_edit(Some(&graph), &worker).is_ok());
        // Reads are never edits
        let read = payload(json!({"tool_name":"Read","tool_input":{"file_path":"src/a.rs"}}));
        assert!(check_file_edit(Some(&graph), &read).is_ok());
    }

    #[test]
    fn test_state_file_writes_refused() {
        let state = Path::new("/r/.conductor/state.json");
        for cmd in [
            "echo '{}' > .conductor/state.json",
            "jq '.current_wave = 2' .conductor/state.json | tee .conductor/state.json",
            "sed -i 's/pending/completed/' /r/.conductor/state.json",
            "rm .conductor/state.json",
        ] {
            let p = payload(json!({"tool_name":"Bash","tool_input":{"command":cmd}}));
            assert!(
                matches!(check_state_file_write(&p, state), Err(GuardViolation::StateFileWrite { .. })),
                "expected refusal: {cmd}"
            );
        }

        let read = payload(json!({"tool_name":"Bash","tool_input":{"command":"cat .conductor/state.json"}}));
        assert!(check_state_file_write(&read, state).is_ok());

        let write = payload(json!({"tool_name":"Write","tool_input":{"file_path":"/r/.conductor/state.json"},"agent_id":"w"}));
        assert!(check_state_file_write(&write, state).is_err());
    }

    #[test]
    fn test_dispatch_requires_execute_phase_and_current_wave() {
        let mut graph = execute_graph();
        assert!(check_dispatch(&graph, &request("T1"), &BTreeMap::new()).is_ok());

        assert!(matches!(
            check_dispatch(&graph, &request("T3"), &BTreeMap::new()),
            Err(GuardViolation::WrongWave { task_wave: 2, current_wave: 1, .. })
        ));
        assert!(matches!(
            check_dispatch(&graph, &request("T9"), &BTreeMap::new()),
            Err(GuardViolation::UnknownTask { .. })
        ));

        graph.current_phase = Phase::Design;
        assert!(matches!(
            check_dispatch(&graph, &request("T1"), &BTreeMap::new()),
            Err(GuardViolation::NotExecuting { .. })
        ));
    }

    #[test]
    fn test_dispatch_waits_for_dependencies() {
        let mut graph = execute_graph();
        assert_eq!(
            check_dispatch(&graph, &request("T2"), &BTreeMap::new()),
            Err(GuardViolation::DependenciesIncomplete {
                task_id: "T2".to_string(),
                pending: vec!["T1".to_string()]
            })
        );
        graph.task_mut("T1").unwrap().status = TaskStatus::Implemented;
        assert!(check_dispatch(&graph, &request("T2"), &BTreeMap::new()).is_ok());
    }

    #[test]
    fn test_dispatch_refuses_running_task_but_allows_retry() {
        let mut graph = execute_graph();
        graph.task_mut("T1").unwrap().status = TaskStatus::InProgress;
        assert!(matches!(
            check_dispatch(&graph, &request("T1"), &BTreeMap::new()),
            Err(GuardViolation::AlreadyDispatched { .. })
        ));
        graph.task_mut("T1").unwrap().status = TaskStatus::Failed;
        assert!(check_dispatch(&graph, &request("T1"), &BTreeMap::new()).is_ok());
    }

    #[test]
    fn test_dispatch_model_declaration() {
        let graph = execute_graph();
        let agents = agents("implementer", "sonnet");

        assert!(matches!(
            check_dispatch(&graph, &request("T1"), &agents),
            Err(GuardViolation::MissingModel { .. })
        ));
        let wrong = DispatchRequest {
            model: Some("haiku"),
            ..request("T1")
        };
        assert!(matches!(
            check_dispatch(&graph, &wrong, &agents),
            Err(GuardViolation::ModelMismatch { .. })
        ));
        let right = DispatchRequest {
            model: Some("Sonnet"),
            ..request("T1")
        };
        assert!(check_dispatch(&graph, &right, &agents).is_ok());
        // Roles without a declaration are unconstrained
        let other_role = DispatchRequest {
            role: Some("writer"),
            ..request("T1")
        };
        assert!(check_dispatch(&graph, &other_role, &agents).is_ok());
    }

    #[test]
    fn test_tool_use_routes_worker_dispatch() {
        let graph = execute_graph();
        let state = Path::new("/r/.conductor/state.json");
        let agents = agents("implementer", "sonnet");

        let dispatch = payload(json!({"tool_name":"Task","tool_input":{
            "subagent_type":"implementer","model":"sonnet","prompt":"Implement TASK_ID: T3"}}));
        assert!(matches!(
            check_tool_use(Some(&graph), &dispatch, state, &agents),
            Err(GuardViolation::WrongWave { .. })
        ));

        let dispatch = payload(json!({"tool_name":"Task","tool_input":{
            "subagent_type":"implementer","model":"sonnet","prompt":"TASK_ID: T1"}}));
        assert!(check_tool_use(Some(&graph), &dispatch, state, &agents).is_ok());

        let mut design = graph.clone();
        design.current_phase = Phase::Design;
        let explore = payload(json!({"tool_name":"Task","tool_input":{"prompt":"look around"}}));
        assert!(check_tool_use(Some(&design), &explore, state, &agents).is_ok());
        assert!(check_tool_use(None, &explore, state, &agents).is_ok());
    }

    #[test]
    fn test_execute_dispatch_without_task_id_refused() {
        let graph = execute_graph();
        let state = Path::new("/r/.conductor/state.json");
        let agents = agents("implementer", "sonnet");

        let anonymous = payload(json!({"tool_name":"Task","tool_input":{
            "subagent_type":"implementer","prompt":"implement whatever is left"}}));
        let err = check_tool_use(Some(&graph), &anonymous, state, &agents).unwrap_err();
        assert_eq!(
            err,
            GuardViolation::MissingTaskId {
                role: "implementer".to_string()
            }
        );
        assert!(err.explain().contains("TASK_ID"));

        // Even with the right model declared
        let modelled = payload(json!({"tool_name":"Task","tool_input":{
            "subagent_type":"implementer","model":"sonnet","prompt":"no id here"}}));
        assert!(check_tool_use(Some(&graph), &modelled, state, &agents).is_err());
    }

    #[test]
    fn test_admit_dispatch_marks_task_running() {
        let mut graph = execute_graph();
        admit_dispatch(&mut graph, &request("T1"), &BTreeMap::new(), Some("abc123".to_string())).unwrap();

        let task = graph.task("T1").unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.start_sha.as_deref(), Some("abc123"));
        assert!(graph.executing_tasks.contains("T1"));
        assert!(graph.executing_is_consistent());

        // A second admission trips the running-task guard and changes nothing
        let before = graph.clone();
        assert!(matches!(
            admit_dispatch(&mut graph, &request("T1"), &BTreeMap::new(), None),
            Err(GuardViolation::AlreadyDispatched { .. })
        ));
        assert_eq!(graph, before);
    }
}
