//! Phase status and completion commands.

use anyhow::Result;
use std::path::Path;

use conductor::config::Config;
use conductor::gates::{GateOutcome, evaluate};
use conductor::init::is_initialized;
use conductor::phase::{ArtifactLayout, Phase};
use conductor::state::{TaskGraph, TaskStatus, TestsState};
use conductor::transition::{FsArtifacts, PhaseResolver, Resolution};

use super::{open_store, require_graph};

fn status_style(status: TaskStatus) -> console::StyledObject<&'static str> {
    let s = console::style(status.as_str());
    match status {
        TaskStatus::Pending => s.dim(),
        TaskStatus::InProgress => s.cyan(),
        TaskStatus::Implemented => s.yellow(),
        TaskStatus::Completed => s.green(),
        TaskStatus::Failed => s.red(),
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn print_phases(graph: &TaskGraph) {
    println!("Phases:");
    for phase in Phase::all() {
        let marker = if *phase == graph.current_phase && graph.is_active() {
            console::style("▶").cyan().bold().to_string()
        } else if graph.skipped_phases.contains(phase) {
            console::style("-").dim().to_string()
        } else if *phase < graph.current_phase || !graph.is_active() {
            console::style("✓").green().to_string()
        } else {
            " ".to_string()
        };
        let artifact = graph
            .phase_artifacts
            .get(phase)
            .map(|p| format!("  {}", console::style(p.display()).dim()))
            .unwrap_or_default();
        let skipped = if graph.skipped_phases.contains(phase) {
            " (skipped)"
        } else {
            ""
        };
        println!("  {} {:<10}{}{}", marker, phase.as_str(), skipped, artifact);
    }
}

fn print_tasks(graph: &TaskGraph) {
    println!();
    println!(
        "{:<10} {:<5} {:<12} {:<6} {:<6} {:<24} Agent",
        "Task", "Wave", "Status", "Tests", "New", "Review"
    );
    println!(
        "{:<10} {:<5} {:<12} {:<6} {:<6} {:<24} -----",
        "----------", "-----", "------------", "------", "------", "------------------------"
    );
    for task in &graph.tasks {
        println!(
            "{:<10} {:<5} {:<12} {:<6} {:<6} {:<24} {}",
            task.id,
            task.wave,
            status_style(task.status),
            yes_no(task.tests_passed),
            if task.new_tests_required {
                yes_no(task.new_tests_written)
            } else {
                "n/a"
            },
            task.review_status.to_string(),
            task.agent
        );
        if let Some(reason) = &task.failure_reason {
            println!(
                "           {} {} (retries: {})",
                console::style("failure:").red(),
                reason,
                task.retry_count
            );
        }
        for finding in &task.critical_findings {
            println!("           {} {}", console::style("critical:").red(), finding);
        }
    }
}

fn print_gates(graph: &TaskGraph) {
    if graph.wave_gates.is_empty() {
        return;
    }
    println!();
    println!("Wave gates:");
    for (wave, gate) in &graph.wave_gates {
        let tests = match gate.tests_passed {
            TestsState::Pass => "pass",
            TestsState::Fail => "fail",
            TestsState::Unknown => "unknown",
        };
        println!(
            "  wave {}: implemented={} tests={} reviews={} blocked={}",
            wave,
            yes_no(gate.impl_complete),
            tests,
            yes_no(gate.reviews_complete),
            yes_no(gate.blocked)
        );
    }
}

pub fn cmd_status(config: &Config, json: bool) -> Result<()> {
    let graph = open_store(config).load()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
        return Ok(());
    }

    let Some(graph) = graph else {
        println!();
        println!("No active workflow.");
        println!();
        if is_initialized(&config.project_dir) {
            println!("Run 'conductor start <feature>' to begin.");
        } else {
            println!("This project is not initialized. Run 'conductor init', then 'conductor start <feature>'.");
        }
        println!();
        return Ok(());
    };

    println!();
    println!(
        "Workflow: {} ({})",
        console::style(&graph.feature).bold(),
        graph.run_id
    );
    if let Some(done) = graph.completed_at {
        println!(
            "State:    {} at {}",
            console::style("complete").green().bold(),
            done.format("%Y-%m-%d %H:%M:%S")
        );
    } else {
        println!("Phase:    {}", console::style(graph.current_phase).cyan());
    }
    if !graph.tasks.is_empty() {
        println!("Wave:     {}", graph.current_wave);
    }
    if !graph.executing_tasks.is_empty() {
        let running: Vec<&str> = graph.executing_tasks.iter().map(String::as_str).collect();
        println!("Running:  {}", running.join(", "));
    }
    println!();
    print_phases(&graph);

    if !graph.tasks.is_empty() {
        print_tasks(&graph);
        print_gates(&graph);

        if graph.is_active()
            && let GateOutcome::NotReady { wave, pending } = evaluate(&graph, graph.current_wave)
            && !pending.is_empty()
        {
            println!();
            println!("Wave {} waiting on: {}", wave, pending.join(", "));
        }
    }

    if let Some(check) = &graph.spec_check {
        println!();
        println!(
            "Spec check (wave {}): {} critical, {} high, verdict {}",
            check.wave, check.critical_count, check.high_count, check.verdict
        );
    }
    println!();
    Ok(())
}

pub fn cmd_complete_phase(config: &Config, phase: Phase, artifact: Option<&Path>) -> Result<()> {
    let store = open_store(config);
    require_graph(&store)?;

    let layout = ArtifactLayout::from_workflow(&config.toml.workflow);
    let artifacts = FsArtifacts::new(&config.project_dir);
    let resolver = PhaseResolver {
        project_root: &config.project_dir,
        layout: &layout,
        clarify_threshold: config.clarify_threshold(),
        clarification_marker: &config.toml.workflow.clarification_marker,
        artifacts: &artifacts,
    };

    let (_, resolution) = store.update_with(|graph| {
        let resolution = resolver.resolve(phase, graph, artifact);
        if let Resolution::Advance(transition) = &resolution {
            transition.apply(graph);
        }
        resolution
    })?;

    match resolution {
        Resolution::Advance(transition) => {
            tracing::info!(completed = %transition.completed, next = %transition.next, "phase advanced");
            println!(
                "{} {} complete → {}",
                console::style("✓").green().bold(),
                transition.completed,
                console::style(transition.next).cyan()
            );
            if let Some(path) = &transition.artifact {
                println!("  Artifact: {}", path.display());
            }
            if let Some(skipped) = transition.skipped {
                println!("  Skipped:  {}", skipped);
            }
            Ok(())
        }
        Resolution::Hold(reason) => {
            tracing::info!(phase = %phase, reason = %reason, "phase held");
            anyhow::bail!("Phase '{}' not advanced: {}", phase, reason)
        }
    }
}
