//! Task list loading, worker dispatch, and completion recording.

use anyhow::{Context, Result};
use std::path::Path;

use conductor::config::Config;
use conductor::dag::{first_wave, load_task_list, validate_tasks};
use conductor::errors::GuardViolation;
use conductor::hooks::{DispatchRequest, admit_dispatch};
use conductor::phase::Phase;
use conductor::state::{Task, TaskGraph, TaskStatus};
use conductor::tracker::GitTracker;
use conductor::transcript::{TestRunnerCatalogue, Transcript};
use conductor::updater::{DiffProvider, UpdateOutcome, record_completion};

use super::{open_store, require_graph};

/// Runner catalogue with the project's extra patterns.
pub(crate) fn runner_catalogue(config: &Config) -> Result<TestRunnerCatalogue> {
    TestRunnerCatalogue::with_extra(&config.toml.testing.extra_runner_patterns)
}

/// A task list may replace the current one only before any worker has run.
fn can_load_tasks(graph: &TaskGraph) -> Result<(), String> {
    match graph.current_phase {
        Phase::Decompose => Ok(()),
        Phase::Execute
            if graph.executing_tasks.is_empty()
                && graph.tasks.iter().all(|t| t.status == TaskStatus::Pending) =>
        {
            Ok(())
        }
        Phase::Execute => Err(
            "workers have already been dispatched in this run; start a new workflow to re-plan"
                .to_string(),
        ),
        phase => Err(format!(
            "tasks are loaded during the decompose phase (current phase: {})",
            phase
        )),
    }
}

pub fn cmd_tasks_load(config: &Config, file: &Path) -> Result<()> {
    let tasks: Vec<Task> = load_task_list(file)?
        .into_iter()
        .map(|entry| entry.into_task())
        .collect();
    validate_tasks(&tasks).with_context(|| format!("Invalid task list {}", file.display()))?;

    let store = open_store(config);
    require_graph(&store)?;

    let (graph, loaded) = store.update_with(|graph: &mut TaskGraph| -> Result<usize, String> {
        can_load_tasks(graph)?;
        graph.tasks = tasks;
        graph.executing_tasks.clear();
        graph.wave_gates.clear();
        graph.spec_check = None;
        graph.current_wave = first_wave(&graph.wave_numbers()).unwrap_or(0);
        Ok(graph.tasks.len())
    })?;

    let count = loaded.map_err(|reason| anyhow::anyhow!("Task list not loaded: {}", reason))?;
    let waves = graph.wave_numbers();
    tracing::info!(tasks = count, waves = waves.len(), first_wave = graph.current_wave, "task list loaded");

    println!(
        "{} Loaded {} tasks across {} waves",
        console::style("✓").green().bold(),
        count,
        waves.len()
    );
    for wave in &waves {
        let ids: Vec<&str> = graph.tasks_in_wave(*wave).map(|t| t.id.as_str()).collect();
        println!("  wave {}: {}", wave, ids.join(", "));
    }
    Ok(())
}

pub fn cmd_dispatch(
    config: &Config,
    task_id: &str,
    role: Option<&str>,
    model: Option<&str>,
) -> Result<()> {
    let store = open_store(config);
    require_graph(&store)?;

    let start_sha = GitTracker::discover(&config.project_dir).and_then(|t| t.head_sha());
    let request = DispatchRequest {
        task_id,
        role,
        model,
    };

    let (_, admitted) = store.update_with(|graph: &mut TaskGraph| -> Result<(), GuardViolation> {
        admit_dispatch(graph, &request, &config.toml.agents, start_sha.clone())
    })?;

    if let Err(violation) = admitted {
        tracing::warn!(task_id = %task_id, violation = %violation, "dispatch refused");
        anyhow::bail!("{}", violation.explain());
    }

    tracing::info!(task_id = %task_id, start_sha = ?start_sha, "task dispatched");
    println!(
        "{} Dispatched {}",
        console::style("✓").green().bold(),
        task_id
    );
    Ok(())
}

/// Print what the updater did.
pub(crate) fn report_outcome(outcome: &UpdateOutcome) {
    match outcome {
        UpdateOutcome::Implemented {
            task_id,
            wave,
            wave_complete,
        } => {
            println!(
                "{} {} implemented (wave {})",
                console::style("✓").green().bold(),
                task_id,
                wave
            );
            if *wave_complete {
                println!("  Wave {} fully implemented; run 'conductor wave advance'", wave);
            }
        }
        UpdateOutcome::AlreadyRecorded { task_id } => {
            println!("{} already recorded; nothing changed", task_id);
        }
        UpdateOutcome::Crashed { failed } => {
            println!(
                "{} Worker finished without a task id; failed: {}",
                console::style("✗").red().bold(),
                failed.join(", ")
            );
        }
        UpdateOutcome::UnknownTask { task_id } => {
            println!(
                "{} Transcript names unknown task {}; nothing changed",
                console::style("!").yellow().bold(),
                task_id
            );
        }
        UpdateOutcome::NotDispatched { task_id, status } => {
            println!(
                "{} Transcript names {} which was never dispatched (status {}); evidence refused",
                console::style("!").yellow().bold(),
                task_id,
                status
            );
        }
        UpdateOutcome::NothingExecuting => {
            println!("No task id in transcript and nothing executing; nothing changed");
        }
    }
}

pub fn cmd_record_completion(config: &Config, transcript_path: &Path) -> Result<()> {
    let transcript = Transcript::load(transcript_path)?;
    let catalogue = runner_catalogue(config)?;
    let store = open_store(config);
    let tracker = GitTracker::discover(&config.project_dir);

    let outcome = record_completion(
        &store,
        &transcript,
        &catalogue,
        tracker.as_ref().map(|t| t as &dyn DiffProvider),
    )?;
    report_outcome(&outcome);
    Ok(())
}
