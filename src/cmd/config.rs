//! Configuration view and validation commands: `conductor config`.

use anyhow::Result;

use conductor::config::{ConductorToml, Config};
use conductor::init::{config_file_path, init_project};

use super::super::ConfigCommands;

fn print_toml(toml: &ConductorToml) -> Result<()> {
    for line in toml::to_string_pretty(toml)?.lines() {
        println!("  {}", line);
    }
    Ok(())
}

pub fn cmd_config(config: &Config, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config_file_path(&config.project_dir);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Conductor Configuration");
            println!("=======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No config.toml found at {}", config_path.display());
                println!("Using default configuration:");
            }
            println!();
            print_toml(&config.toml)?;
            println!();

            println!("Effective values (with env overrides):");
            println!("  clarify_threshold = {}", config.clarify_threshold());
            println!("  lock attempts = {}", config.lock_attempts());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No config.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = config.toml.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", console::style(warning).yellow());
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("config.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            init_project(&config.project_dir)?;
            ConductorToml::default().save(&config_path)?;

            println!("Created config.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [workflow] clarify_threshold, specs_dir, plans_dir");
            println!("  - [agents.<role>] model required for each worker role");
            println!("  - [testing] extra_runner_patterns");
            println!();
        }
    }

    Ok(())
}
