//! Editor hook payloads and decisions.
//!
//! This module defines:
//! - `HookEvent`: the editor lifecycle events the conductor answers
//! - `PreToolUsePayload`: a tool call about to run
//! - `SubagentStopPayload`: a worker that just finished
//! - `HookDecision`: the JSON answer written to stdout

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::errors::GuardViolation;

/// Editor lifecycle events the conductor handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    /// Before a tool call runs (can block)
    PreToolUse,
    /// After a worker finishes
    SubagentStop,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::PreToolUse => "pre_tool_use",
            HookEvent::SubagentStop => "subagent_stop",
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for HookEvent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pre_tool_use" | "pretooluse" => Ok(HookEvent::PreToolUse),
            "subagent_stop" | "subagentstop" => Ok(HookEvent::SubagentStop),
            _ => anyhow::bail!(
                "Invalid hook event '{}'. Valid values: pre-tool-use, subagent-stop",
                s
            ),
        }
    }
}

/// A tool call the editor is about to run.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PreToolUsePayload {
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    /// Present when the call comes from inside a worker
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl PreToolUsePayload {
    /// Whether a dispatched worker made this call.
    pub fn from_worker(&self) -> bool {
        self.agent_id.as_deref().is_some_and(|s| !s.is_empty())
            || self.agent_type.as_deref().is_some_and(|s| !s.is_empty())
    }

    fn input_str(&self, key: &str) -> Option<&str> {
        self.tool_input.get(key).and_then(|v| v.as_str())
    }

    /// Target path of a file-mutating call.
    pub fn target_path(&self) -> Option<&str> {
        self.input_str("file_path")
            .or_else(|| self.input_str("notebook_path"))
    }

    /// Shell command of a Bash call.
    pub fn command(&self) -> Option<&str> {
        self.input_str("command")
    }

    /// For a worker dispatch: the requested role.
    pub fn subagent_type(&self) -> Option<&str> {
        self.input_str("subagent_type")
    }

    /// For a worker dispatch: the declared model.
    pub fn model(&self) -> Option<&str> {
        self.input_str("model")
    }

    /// For a worker dispatch: the prompt handed to the worker.
    pub fn prompt(&self) -> Option<&str> {
        self.input_str("prompt")
    }
}

/// A worker that just stopped.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SubagentStopPayload {
    #[serde(default)]
    pub transcript_path: Option<PathBuf>,
    #[serde(default)]
    pub agent_transcript_path: Option<PathBuf>,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl SubagentStopPayload {
    /// The worker's own transcript, falling back to the session transcript.
    pub fn transcript(&self) -> Option<&Path> {
        self.agent_transcript_path
            .as_deref()
            .or(self.transcript_path.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Block,
}

/// JSON answer to a hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookDecision {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl HookDecision {
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            reason: None,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Block,
            reason: Some(reason.into()),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.decision == Decision::Block
    }
}

impl From<Result<(), GuardViolation>> for HookDecision {
    fn from(result: Result<(), GuardViolation>) -> Self {
        match result {
            Ok(()) => Self::allow(),
            Err(violation) => Self::block(violation.explain()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_event_from_str() {
        assert_eq!("pre-tool-use".parse::<HookEvent>().unwrap(), HookEvent::PreToolUse);
        assert_eq!("SubagentStop".parse::<HookEvent>().unwrap(), HookEvent::SubagentStop);
        assert!("post-tool-use".parse::<HookEvent>().is_err());
    }

    #[test]
    fn test_pre_tool_use_payload() {
        let json = r#"{"session_id":"s","tool_name":"Edit","tool_input":{"file_path":"/r/src/a.rs","old_string":"x"}}"#;
        let payload: PreToolUsePayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.target_path(), Some("/r/src/a.rs"));
        assert!(!payload.from_worker());

        let json = r#"{"tool_name":"Write","tool_input":{},"agent_id":"a-1","agent_type":"implementer"}"#;
        let payload: PreToolUsePayload = serde_json::from_str(json).unwrap();
        assert!(payload.from_worker());
        assert_eq!(payload.target_path(), None);
    }

    #[test]
    fn test_subagent_stop_prefers_agent_transcript() {
        let json = r#"{"transcript_path":"/t/session.jsonl","agent_transcript_path":"/t/agent.jsonl"}"#;
        let payload: SubagentStopPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.transcript(), Some(Path::new("/t/agent.jsonl")));

        let payload: SubagentStopPayload = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.transcript(), None);
    }

    #[test]
    fn test_decision_json() {
        assert_eq!(
            serde_json::to_string(&HookDecision::allow()).unwrap(),
            r#"{"decision":"allow"}"#
        );
        let blocked: HookDecision = Err(GuardViolation::UnknownTask {
            task_id: "T9".to_string(),
        })
        .into();
        assert!(blocked.is_blocked());
        let json = serde_json::to_string(&blocked).unwrap();
        assert!(json.starts_with(r#"{"decision":"block","reason":"Task T9"#));
    }
}
