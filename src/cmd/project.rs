//! Workflow lifecycle commands: init, start, abort.

use anyhow::Result;

use conductor::config::Config;
use conductor::init::init_project;
use conductor::state::TaskGraph;

use super::open_store;

pub fn cmd_init(config: &Config) -> Result<()> {
    let result = init_project(&config.project_dir)?;

    println!();
    if result.created {
        println!(
            "{} Initialized conductor in {}",
            console::style("✓").green().bold(),
            result.conductor_dir.display()
        );
    } else {
        println!(
            "Conductor already initialized at {}",
            result.conductor_dir.display()
        );
    }
    println!();
    println!("Next: run 'conductor start <feature>' to begin a workflow.");
    println!();
    Ok(())
}

pub fn cmd_start(config: &Config, feature: &str, force: bool) -> Result<()> {
    let feature = feature.trim();
    if feature.is_empty() {
        anyhow::bail!("Feature name must not be empty");
    }

    init_project(&config.project_dir)?;
    let graph = open_store(config).create(TaskGraph::new(feature), force)?;

    println!(
        "{} Started workflow '{}' (run {})",
        console::style("✓").green().bold(),
        graph.feature,
        graph.run_id
    );
    println!("  Phase: {}", console::style(graph.current_phase).cyan());
    Ok(())
}

pub fn cmd_abort(config: &Config) -> Result<()> {
    match open_store(config).remove()? {
        Some(graph) => {
            println!(
                "{} Aborted workflow '{}' at phase {}",
                console::style("✗").yellow().bold(),
                graph.feature,
                graph.current_phase
            );
        }
        None => println!("No workflow to abort."),
    }
    Ok(())
}
