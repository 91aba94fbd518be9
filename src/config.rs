//! Layered configuration for conductor.
//!
//! Reads `.conductor/config.toml`; every key is optional. Values are layered
//! file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [workflow]
//! clarify_threshold = 3
//! clarification_marker = "NEEDS CLARIFICATION"
//! specs_dir = "specs"
//! plans_dir = "plans"
//! artifact_extension = "md"
//!
//! [lock]
//! max_attempts = 50
//! initial_backoff_ms = 10
//! max_backoff_ms = 250
//!
//! [testing]
//! extra_runner_patterns = ['\bbazel\s+test\b']
//!
//! [agents.implementer]
//! model = "sonnet"
//!
//! [logging]
//! file = false
//! json = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::init::{config_file_path, get_conductor_dir};

/// Phase workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSection {
    /// Clarify runs only when the spec holds more markers than this
    #[serde(default = "default_clarify_threshold")]
    pub clarify_threshold: usize,
    /// Token counted as an unresolved ambiguity in the specification
    #[serde(default = "default_clarification_marker")]
    pub clarification_marker: String,
    /// Directory (relative to the project) holding specification documents
    #[serde(default = "default_specs_dir")]
    pub specs_dir: String,
    /// Directory (relative to the project) holding plan documents
    #[serde(default = "default_plans_dir")]
    pub plans_dir: String,
    /// File extension of phase artifacts, without the dot
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
}

fn default_clarify_threshold() -> usize {
    3
}

fn default_clarification_marker() -> String {
    "NEEDS CLARIFICATION".to_string()
}

fn default_specs_dir() -> String {
    "specs".to_string()
}

fn default_plans_dir() -> String {
    "plans".to_string()
}

fn default_artifact_extension() -> String {
    "md".to_string()
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            clarify_threshold: default_clarify_threshold(),
            clarification_marker: default_clarification_marker(),
            specs_dir: default_specs_dir(),
            plans_dir: default_plans_dir(),
            artifact_extension: default_artifact_extension(),
        }
    }
}

/// State lock retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSection {
    /// Attempts before giving up with a lock timeout
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff interval in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    50
}

fn default_initial_backoff_ms() -> u64 {
    10
}

fn default_max_backoff_ms() -> u64 {
    250
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Test evidence settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestingSection {
    /// Extra regexes recognised as test-runner commands, on top of the built-in catalogue
    #[serde(default)]
    pub extra_runner_patterns: Vec<String>,
}

/// Capability declaration for one worker role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model every dispatch for this role must declare
    #[serde(default)]
    pub model: Option<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Also write a daily-rolling log file under .conductor/logs
    #[serde(default)]
    pub file: bool,
    /// Emit JSON lines on stderr instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

/// The complete config.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConductorToml {
    #[serde(default)]
    pub workflow: WorkflowSection,
    #[serde(default)]
    pub lock: LockSection,
    #[serde(default)]
    pub testing: TestingSection,
    /// Per-role capability declarations, keyed by role name
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ConductorToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config.toml")
    }

    /// Load from `.conductor/config.toml`, or defaults if the file doesn't exist.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let path = config_file_path(project_dir);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.lock.max_attempts == 0 {
            warnings.push("lock.max_attempts is 0; every state update will time out".to_string());
        }
        if self.lock.initial_backoff_ms > self.lock.max_backoff_ms {
            warnings.push(format!(
                "lock.initial_backoff_ms ({}) exceeds lock.max_backoff_ms ({})",
                self.lock.initial_backoff_ms, self.lock.max_backoff_ms
            ));
        }
        for pattern in &self.testing.extra_runner_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                warnings.push(format!(
                    "Invalid testing.extra_runner_patterns entry '{}': {}",
                    pattern, e
                ));
            }
        }
        if self.workflow.clarification_marker.trim().is_empty() {
            warnings.push("workflow.clarification_marker is empty".to_string());
        }

        warnings
    }
}

/// Unified configuration: config.toml merged with environment and CLI settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the project directory
    pub project_dir: PathBuf,
    /// Path to the .conductor directory
    pub conductor_dir: PathBuf,
    /// Parsed config.toml
    pub toml: ConductorToml,
    /// CLI override: verbose logging
    pub verbose: bool,
}

impl Config {
    /// Load configuration for a project, applying environment overrides.
    pub fn load(project_dir: &Path, verbose: bool) -> Result<Self> {
        let toml = ConductorToml::load_or_default(project_dir)?;
        Ok(Self::from_toml(project_dir, toml, verbose))
    }

    /// Build a configuration from an already-parsed file.
    pub fn from_toml(project_dir: &Path, toml: ConductorToml, verbose: bool) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            conductor_dir: get_conductor_dir(project_dir),
            toml,
            verbose,
        }
    }

    /// Clarify threshold, `CONDUCTOR_CLARIFY_THRESHOLD` overriding the file.
    pub fn clarify_threshold(&self) -> usize {
        std::env::var("CONDUCTOR_CLARIFY_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.toml.workflow.clarify_threshold)
    }

    /// Lock attempt budget, `CONDUCTOR_LOCK_ATTEMPTS` overriding the file.
    pub fn lock_attempts(&self) -> u32 {
        std::env::var("CONDUCTOR_LOCK_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.toml.lock.max_attempts)
    }

    pub fn lock_initial_backoff(&self) -> Duration {
        Duration::from_millis(self.toml.lock.initial_backoff_ms)
    }

    pub fn lock_max_backoff(&self) -> Duration {
        Duration::from_millis(self.toml.lock.max_backoff_ms)
    }

    /// Model a role must declare on dispatch, if one is configured.
    pub fn required_model(&self, role: &str) -> Option<&str> {
        self.toml
            .agents
            .get(role)
            .and_then(|agent| agent.model.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempdir().unwrap();
        let toml = ConductorToml::load_or_default(dir.path()).unwrap();
        assert_eq!(toml.workflow.clarify_threshold, 3);
        assert_eq!(toml.workflow.specs_dir, "specs");
        assert_eq!(toml.workflow.plans_dir, "plans");
        assert_eq!(toml.lock.max_attempts, 50);
        assert!(toml.agents.is_empty());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let toml = ConductorToml::parse(
            r#"
[workflow]
clarify_threshold = 5

[agents.implementer]
model = "sonnet"
"#,
        )
        .unwrap();
        assert_eq!(toml.workflow.clarify_threshold, 5);
        assert_eq!(toml.workflow.clarification_marker, "NEEDS CLARIFICATION");
        assert_eq!(
            toml.agents.get("implementer").unwrap().model.as_deref(),
            Some("sonnet")
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut toml = ConductorToml::default();
        toml.agents.insert(
            "reviewer".to_string(),
            AgentConfig {
                model: Some("opus".to_string()),
            },
        );
        toml.save(&path).unwrap();

        let loaded = ConductorToml::load(&path).unwrap();
        assert_eq!(loaded.lock.max_attempts, 50);
        assert_eq!(
            loaded.agents.get("reviewer").unwrap().model.as_deref(),
            Some("opus")
        );
    }

    #[test]
    fn test_parse_invalid_toml_fails() {
        assert!(ConductorToml::parse("[workflow\nclarify_threshold = ").is_err());
    }

    #[test]
    fn test_validate_flags_bad_runner_regex() {
        let mut toml = ConductorToml::default();
        toml.testing.extra_runner_patterns = vec!["(unclosed".to_string()];
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("(unclosed"));
    }

    #[test]
    fn test_validate_flags_inverted_backoff() {
        let mut toml = ConductorToml::default();
        toml.lock.initial_backoff_ms = 500;
        toml.lock.max_backoff_ms = 100;
        assert!(toml.validate().iter().any(|w| w.contains("exceeds")));
    }

    #[test]
    fn test_required_model_lookup() {
        let dir = tempdir().unwrap();
        let toml = ConductorToml::parse("[agents.reviewer]\nmodel = \"opus\"\n").unwrap();
        let config = Config::from_toml(dir.path(), toml, false);
        assert_eq!(config.required_model("reviewer"), Some("opus"));
        assert_eq!(config.required_model("implementer"), None);
    }

    #[test]
    fn test_config_load_reads_project_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".conductor")).unwrap();
        std::fs::write(
            dir.path().join(".conductor/config.toml"),
            "[lock]\nmax_backoff_ms = 40\n",
        )
        .unwrap();
        let config = Config::load(dir.path(), false).unwrap();
        assert_eq!(config.lock_max_backoff(), Duration::from_millis(40));
        assert_eq!(config.conductor_dir, dir.path().join(".conductor"));
    }
}
