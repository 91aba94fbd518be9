//! Review and spec-check recording commands.

use anyhow::{Context, Result};
use std::path::Path;

use conductor::config::Config;
use conductor::review::{parse_review, parse_spec_check, record_spec_check};
use conductor::state::{ReviewStatus, SpecVerdict, TaskGraph};

use super::{open_store, require_graph};

fn read_output(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

pub fn cmd_review(config: &Config, task_id: &str, file: &Path) -> Result<()> {
    let output = read_output(file)?;
    let findings = parse_review(&output);

    let store = open_store(config);
    require_graph(&store)?;
    let (_, found) = store.update_with(|graph: &mut TaskGraph| match graph.task_mut(task_id) {
        Some(task) => {
            findings.apply_to(task);
            true
        }
        None => false,
    })?;

    if !found {
        anyhow::bail!(
            "Task {} is not part of the workflow. Check the task id with 'conductor status'",
            task_id
        );
    }

    let status = findings.status();
    tracing::info!(
        task_id = %task_id,
        status = %status,
        critical = findings.critical.len(),
        advisory = findings.advisory.len(),
        "review recorded"
    );

    match status {
        ReviewStatus::Passed => println!(
            "{} Review for {} passed ({} advisory)",
            console::style("✓").green().bold(),
            task_id,
            findings.advisory.len()
        ),
        ReviewStatus::Blocked => {
            println!(
                "{} Review for {} blocked by {} critical finding(s):",
                console::style("✗").red().bold(),
                task_id,
                findings.critical.len()
            );
            for finding in &findings.critical {
                println!("  - {}", finding);
            }
        }
        ReviewStatus::EvidenceCaptureFailed | ReviewStatus::Pending => println!(
            "{} No findings markers in {}; recorded as {}",
            console::style("!").yellow().bold(),
            file.display(),
            status
        ),
    }
    Ok(())
}

pub fn cmd_spec_check(config: &Config, file: &Path) -> Result<()> {
    let output = read_output(file)?;

    let store = open_store(config);
    require_graph(&store)?;
    let (_, recorded) = store.update_with(|graph: &mut TaskGraph| {
        let check = parse_spec_check(&output, graph.current_wave)?;
        record_spec_check(graph, check.clone());
        Some(check)
    })?;

    let Some(check) = recorded else {
        anyhow::bail!(
            "No spec-check markers found in {}. Expected lines such as 'VERDICT: PASS' or 'CRITICAL: ...'",
            file.display()
        );
    };

    tracing::info!(
        wave = check.wave,
        critical = check.critical_count,
        high = check.high_count,
        verdict = %check.verdict,
        "spec check recorded"
    );

    let mark = match check.verdict {
        SpecVerdict::Pass => console::style("✓").green().bold(),
        SpecVerdict::Warn | SpecVerdict::Unknown => console::style("!").yellow().bold(),
        SpecVerdict::Fail => console::style("✗").red().bold(),
    };
    println!(
        "{} Spec check for wave {}: {} critical, {} high, verdict {}",
        mark, check.wave, check.critical_count, check.high_count, check.verdict
    );
    if check.critical_count > 0 {
        println!("  Wave {} is blocked until the critical issues are fixed", check.wave);
    }
    Ok(())
}
