//! Project layout for conductor.
//!
//! `conductor init` creates the `.conductor/` directory in a project:
//!
//! ```text
//! .conductor/
//! ├── state.json       # The shared task graph (present only while a workflow exists)
//! ├── state.lock       # Cooperative lock guarding state.json
//! ├── config.toml      # Optional configuration
//! └── logs/            # Optional rolling log files
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// The name of the conductor directory.
pub const CONDUCTOR_DIR: &str = ".conductor";

/// File name of the shared state document.
pub const STATE_FILE: &str = "state.json";

/// File name of the cooperative lock guarding the state document.
pub const LOCK_FILE: &str = "state.lock";

/// File name of the optional configuration.
pub const CONFIG_FILE: &str = "config.toml";

/// Result of initializing a conductor project.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the .conductor directory
    pub conductor_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
}

/// Initialize a conductor project in the given directory.
///
/// Idempotent: an existing directory is completed, never overwritten.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let conductor_dir = get_conductor_dir(project_dir);
    let created = !conductor_dir.exists();

    std::fs::create_dir_all(conductor_dir.join("logs")).with_context(|| {
        format!(
            "Failed to create conductor directory: {}",
            conductor_dir.display()
        )
    })?;

    Ok(InitResult {
        conductor_dir,
        created,
    })
}

/// Check if a project is already initialized.
pub fn is_initialized(project_dir: &Path) -> bool {
    get_conductor_dir(project_dir).exists()
}

/// Get the path to the conductor directory for a project.
pub fn get_conductor_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(CONDUCTOR_DIR)
}

/// Path of the shared state document for a project.
pub fn state_file_path(project_dir: &Path) -> PathBuf {
    get_conductor_dir(project_dir).join(STATE_FILE)
}

/// Path of the state lock file for a project.
pub fn lock_file_path(project_dir: &Path) -> PathBuf {
    get_conductor_dir(project_dir).join(LOCK_FILE)
}

/// Path of the configuration file for a project.
pub fn config_file_path(project_dir: &Path) -> PathBuf {
    get_conductor_dir(project_dir).join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_project_creates_conductor_directory() {
        let dir = tempdir().unwrap();
        let result = init_project(dir.path()).unwrap();

        assert!(result.created);
        assert_eq!(result.conductor_dir, dir.path().join(".conductor"));
        assert!(result.conductor_dir.join("logs").is_dir());
    }

    #[test]
    fn test_init_project_is_idempotent() {
        let dir = tempdir().unwrap();
        assert!(init_project(dir.path()).unwrap().created);

        std::fs::write(config_file_path(dir.path()), "[workflow]\n").unwrap();
        let again = init_project(dir.path()).unwrap();
        assert!(!again.created);

        // Existing files are left alone
        let content = std::fs::read_to_string(config_file_path(dir.path())).unwrap();
        assert_eq!(content, "[workflow]\n");
    }

    #[test]
    fn test_is_initialized() {
        let dir = tempdir().unwrap();
        assert!(!is_initialized(dir.path()));
        init_project(dir.path()).unwrap();
        assert!(is_initialized(dir.path()));
    }

    #[test]
    fn test_paths_live_under_conductor_dir() {
        let dir = tempdir().unwrap();
        let base = dir.path().join(".conductor");
        assert_eq!(state_file_path(dir.path()), base.join("state.json"));
        assert_eq!(lock_file_path(dir.path()), base.join("state.lock"));
        assert_eq!(config_file_path(dir.path()), base.join("config.toml"));
    }
}
