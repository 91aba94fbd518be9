//! Editor hook integration.
//!
//! The editor calls `conductor hook <event>` with a JSON payload on stdin and
//! reads a JSON decision from stdout. Two events are handled:
//!
//! - `pre-tool-use`: runs the ordering guards and may block the call; an
//!   admitted worker dispatch is recorded as running
//! - `subagent-stop`: records a finished worker's evidence (never blocks)
//!
//! # Registration
//!
//! ```json
//! {
//!   "hooks": {
//!     "PreToolUse": [{ "hooks": [{ "type": "command", "command": "conductor hook pre-tool-use" }] }],
//!     "SubagentStop": [{ "hooks": [{ "type": "command", "command": "conductor hook subagent-stop" }] }]
//!   }
//! }
//! ```

mod guards;
mod types;

pub use guards::{
    DISPATCH_TOOL, DispatchRequest, admit_dispatch, check_dispatch, check_file_edit,
    check_state_file_write, check_tool_use, dispatch_request, dispatch_task_id,
    is_governed_dispatch,
};
pub use types::{Decision, HookDecision, HookEvent, PreToolUsePayload, SubagentStopPayload};

use crate::config::Config;
use crate::errors::{GuardViolation, StoreError};
use crate::init::state_file_path;
use crate::state::{StateStore, TaskGraph};
use crate::tracker::GitTracker;

/// Answer a pre-tool-use hook for a project.
pub fn pre_tool_use(config: &Config, graph: Option<&TaskGraph>, payload: &PreToolUsePayload) -> HookDecision {
    let state_file = state_file_path(&config.project_dir);
    let result = check_tool_use(graph, payload, &state_file, &config.toml.agents);

    if let Err(violation) = &result {
        tracing::warn!(
            tool = %payload.tool_name,
            violation = %violation,
            "tool call blocked"
        );
    }

    result.into()
}

/// Answer a pre-tool-use hook against the project's store.
///
/// A worker dispatch during execute is checked and, when admitted, recorded
/// in the same locked update: the task goes in progress, joins the executing
/// set and gets its `start_sha` checkpoint. Every other call is evaluated
/// against a read-only snapshot.
pub fn answer_pre_tool_use(
    config: &Config,
    store: &StateStore,
    payload: &PreToolUsePayload,
) -> Result<HookDecision, StoreError> {
    let graph = match store.load() {
        Ok(graph) => graph,
        Err(e) => {
            // Guards that need no graph still apply
            tracing::error!(error = %e, "could not read workflow state; evaluating without it");
            None
        }
    };

    if !graph.as_ref().is_some_and(|g| is_governed_dispatch(g, payload)) {
        return Ok(pre_tool_use(config, graph.as_ref(), payload));
    }

    let start_sha = GitTracker::discover(&config.project_dir).and_then(|t| t.head_sha());
    let state_file = state_file_path(&config.project_dir);
    let agents = &config.toml.agents;

    let (_, admitted) = store.update_with(|graph: &mut TaskGraph| -> Result<Option<String>, GuardViolation> {
        // The snapshot may be stale; re-check against the locked graph
        if !is_governed_dispatch(graph, payload) {
            return check_tool_use(Some(&*graph), payload, &state_file, agents).map(|()| None);
        }
        check_state_file_write(payload, &state_file)?;
        let task_id = dispatch_task_id(payload)?;
        admit_dispatch(graph, &dispatch_request(payload, &task_id), agents, start_sha.clone())?;
        Ok(Some(task_id))
    })?;

    Ok(match admitted {
        Ok(Some(task_id)) => {
            tracing::info!(task_id = %task_id, start_sha = ?start_sha, "worker dispatch admitted and recorded");
            HookDecision::allow()
        }
        Ok(None) => HookDecision::allow(),
        Err(violation) => {
            tracing::warn!(tool = %payload.tool_name, violation = %violation, "worker dispatch blocked");
            HookDecision::from(Err::<(), _>(violation))
        }
    })
}
