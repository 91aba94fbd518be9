//! Editor hook entry point: payload on stdin, decision on stdout.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

use conductor::config::Config;
use conductor::hooks::{
    HookDecision, HookEvent, PreToolUsePayload, SubagentStopPayload, answer_pre_tool_use,
};
use conductor::phase::{ArtifactLayout, Phase};
use conductor::state::{StateStore, TaskGraph};
use conductor::tracker::GitTracker;
use conductor::transcript::{Transcript, extract_phase_artifacts};
use conductor::transition::{FsArtifacts, PhaseResolver, Resolution};
use conductor::updater::{DiffProvider, record_completion};

use super::open_store;
use super::tasks::runner_catalogue;

fn read_stdin() -> Result<String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read hook payload from stdin")?;
    Ok(input)
}

fn emit(decision: &HookDecision) -> Result<()> {
    println!("{}", serde_json::to_string(decision)?);
    Ok(())
}

pub fn cmd_hook(config: &Config, event: HookEvent) -> Result<()> {
    let input = read_stdin()?;
    match event {
        HookEvent::PreToolUse => {
            let payload: PreToolUsePayload =
                serde_json::from_str(&input).context("Invalid pre-tool-use payload")?;
            emit(&answer_pre_tool_use(config, &open_store(config), &payload)?)
        }
        HookEvent::SubagentStop => {
            let payload: SubagentStopPayload =
                serde_json::from_str(&input).context("Invalid subagent-stop payload")?;
            // Recording never blocks the editor; failures surface on stderr
            emit(&HookDecision::allow())?;
            handle_subagent_stop(config, &payload)
        }
    }
}

fn handle_subagent_stop(config: &Config, payload: &SubagentStopPayload) -> Result<()> {
    let Some(path) = payload.transcript() else {
        tracing::warn!("subagent-stop payload carries no transcript path");
        return Ok(());
    };

    let store = open_store(config);
    let Some(graph) = store.load()? else {
        tracing::debug!("no active workflow; ignoring finished worker");
        return Ok(());
    };

    let transcript = Transcript::load(path)?;

    if graph.current_phase == Phase::Execute {
        let catalogue = runner_catalogue(config)?;
        let tracker = GitTracker::discover(&config.project_dir);
        record_completion(
            &store,
            &transcript,
            &catalogue,
            tracker.as_ref().map(|t| t as &dyn DiffProvider),
        )?;
    } else {
        try_phase_transition(config, &store, &transcript)?;
    }
    Ok(())
}

/// A planning worker finished: advance if it wrote the phase's artifact.
fn try_phase_transition(config: &Config, store: &StateStore, transcript: &Transcript) -> Result<()> {
    let layout = ArtifactLayout::from_workflow(&config.toml.workflow);
    let found = extract_phase_artifacts(transcript, &layout);
    let artifacts = FsArtifacts::new(&config.project_dir);
    let resolver = PhaseResolver {
        project_root: &config.project_dir,
        layout: &layout,
        clarify_threshold: config.clarify_threshold(),
        clarification_marker: &config.toml.workflow.clarification_marker,
        artifacts: &artifacts,
    };

    let (_, resolution) = store.update_with(|graph: &mut TaskGraph| {
        let phase = graph.current_phase;
        let candidate = phase
            .artifact_kind()
            .and_then(|kind| found.for_kind(kind))
            .map(Path::new);
        // Clarify may finish by editing the spec in place
        if candidate.is_none() && phase != Phase::Clarify {
            return None;
        }
        let resolution = resolver.resolve(phase, graph, candidate);
        if let Resolution::Advance(transition) = &resolution {
            transition.apply(graph);
        }
        Some((phase, resolution))
    })?;

    match resolution {
        Some((_, Resolution::Advance(transition))) => {
            tracing::info!(completed = %transition.completed, next = %transition.next, "phase advanced from worker artifact");
        }
        Some((phase, Resolution::Hold(reason))) => {
            tracing::info!(phase = %phase, reason = %reason, "phase held");
        }
        None => tracing::debug!("finished worker wrote no phase artifact"),
    }
    Ok(())
}
