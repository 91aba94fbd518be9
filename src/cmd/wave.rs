//! Wave gate commands.

use anyhow::Result;

use conductor::config::Config;
use conductor::gates::{GateOutcome, GateReport, WaveAdvance, advance_wave, evaluate};
use conductor::phase::Phase;
use conductor::state::TaskGraph;

use super::{open_store, require_graph};

fn print_report(report: &GateReport) {
    for check in &report.checks {
        let line = check.to_string();
        if check.passed {
            println!("  {}", console::style(line).green());
        } else {
            println!("  {}", console::style(line).red());
        }
    }
}

fn ensure_executing(graph: &TaskGraph) -> Result<()> {
    if graph.current_phase != Phase::Execute {
        anyhow::bail!(
            "Waves run in the execute phase (current phase: {}). Finish planning with 'conductor complete-phase'",
            graph.current_phase
        );
    }
    Ok(())
}

pub fn cmd_wave_check(config: &Config) -> Result<()> {
    let graph = require_graph(&open_store(config))?;
    ensure_executing(&graph)?;

    match evaluate(&graph, graph.current_wave) {
        GateOutcome::NotReady { wave, pending } => {
            println!("Wave {} is not ready; waiting on: {}", wave, pending.join(", "));
        }
        GateOutcome::Evaluated(report) => {
            let verdict = if report.passed() {
                console::style("passes").green().bold()
            } else {
                console::style("fails").red().bold()
            };
            println!("Wave {} gate {}:", report.wave, verdict);
            print_report(&report);
        }
    }
    Ok(())
}

pub fn cmd_wave_advance(config: &Config) -> Result<()> {
    let store = open_store(config);
    let graph = require_graph(&store)?;
    ensure_executing(&graph)?;
    if !graph.is_active() {
        println!("Workflow '{}' is already complete.", graph.feature);
        return Ok(());
    }

    let (_, advance) = store.update_with(advance_wave)?;

    match advance {
        WaveAdvance::NotReady { wave, pending } => {
            tracing::info!(wave, pending = ?pending, "wave not ready");
            anyhow::bail!(
                "Wave {} is not fully implemented; waiting on: {}",
                wave,
                pending.join(", ")
            )
        }
        WaveAdvance::Blocked(report) => {
            let failed: Vec<&str> = report.failures().map(|c| c.name).collect();
            tracing::warn!(wave = report.wave, failed = ?failed, "wave gate blocked");
            println!(
                "{} Wave {} gate failed:",
                console::style("✗").red().bold(),
                report.wave
            );
            print_report(&report);
            anyhow::bail!("Wave {} blocked by: {}", report.wave, failed.join(", "))
        }
        WaveAdvance::Advanced { report, next } => {
            tracing::info!(wave = report.wave, next, "wave advanced");
            println!(
                "{} Wave {} passed; wave {} is now current",
                console::style("✓").green().bold(),
                report.wave,
                next
            );
            print_report(&report);
            Ok(())
        }
        WaveAdvance::Finished(report) => {
            tracing::info!(wave = report.wave, "final wave passed; workflow complete");
            println!(
                "{} Wave {} passed; workflow complete",
                console::style("✓").green().bold(),
                report.wave
            );
            print_report(&report);
            Ok(())
        }
    }
}
