use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use conductor::config::Config;
use conductor::hooks::HookEvent;
use conductor::phase::Phase;

mod cmd;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(
    version,
    about = "Phase and wave orchestrator that gates untrusted workers on transcript evidence"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the .conductor directory
    Init,
    /// Start a new workflow at the explore phase
    Start {
        /// Short feature name
        feature: String,
        /// Replace an active workflow
        #[arg(long)]
        force: bool,
    },
    /// Show the current phase, wave, tasks and gates
    Status {
        /// Print the raw task graph as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report a phase as finished and advance if its artifact checks out
    CompletePhase {
        phase: Phase,
        /// Artifact the phase produced (relative to the project)
        #[arg(long)]
        artifact: Option<PathBuf>,
    },
    /// Remove the active workflow
    Abort,
    /// Manage the decomposed task list
    Tasks {
        #[command(subcommand)]
        command: TasksCommands,
    },
    /// Admit a worker for a task and mark it in progress
    Dispatch {
        task_id: String,
        /// Execution role (defaults to the task's agent)
        #[arg(long)]
        role: Option<String>,
        /// Model the worker runs with
        #[arg(long)]
        model: Option<String>,
    },
    /// Record a finished worker from its transcript
    RecordCompletion {
        /// Path to the worker's JSONL transcript
        #[arg(long)]
        transcript: PathBuf,
    },
    /// Record review output for a task
    Review {
        task_id: String,
        /// File holding the reviewer's output
        #[arg(long)]
        file: PathBuf,
    },
    /// Record specification alignment output
    SpecCheck {
        /// File holding the spec-check output
        #[arg(long)]
        file: PathBuf,
    },
    /// Evaluate and advance waves
    Wave {
        #[command(subcommand)]
        command: WaveCommands,
    },
    /// Answer an editor hook (payload on stdin, decision on stdout)
    Hook { event: HookEvent },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum TasksCommands {
    /// Load a JSON or YAML task list
    Load { file: PathBuf },
}

#[derive(Subcommand, Clone)]
pub enum WaveCommands {
    /// Show the gate checks for the current wave without changing anything
    Check,
    /// Advance past the current wave if its gate passes
    Advance,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default config.toml
    Init,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = Config::load(&project_dir, cli.verbose)?;
    let _logging = conductor::logging::init(&config)?;

    match &cli.command {
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Start { feature, force } => cmd::cmd_start(&config, feature, *force)?,
        Commands::Status { json } => cmd::cmd_status(&config, *json)?,
        Commands::CompletePhase { phase, artifact } => {
            cmd::cmd_complete_phase(&config, *phase, artifact.as_deref())?
        }
        Commands::Abort => cmd::cmd_abort(&config)?,
        Commands::Tasks { command } => match command {
            TasksCommands::Load { file } => cmd::cmd_tasks_load(&config, file)?,
        },
        Commands::Dispatch {
            task_id,
            role,
            model,
        } => cmd::cmd_dispatch(&config, task_id, role.as_deref(), model.as_deref())?,
        Commands::RecordCompletion { transcript } => {
            cmd::cmd_record_completion(&config, transcript)?
        }
        Commands::Review { task_id, file } => cmd::cmd_review(&config, task_id, file)?,
        Commands::SpecCheck { file } => cmd::cmd_spec_check(&config, file)?,
        Commands::Wave { command } => match command {
            WaveCommands::Check => cmd::cmd_wave_check(&config)?,
            WaveCommands::Advance => cmd::cmd_wave_advance(&config)?,
        },
        Commands::Hook { event } => cmd::cmd_hook(&config, *event)?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
