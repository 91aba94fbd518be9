//! Task list loading and validation.
//!
//! A decomposed task list is accepted only when its dependency structure is
//! consistent with the wave ordering:
//! - ids are unique and every dependency names an existing task
//! - no task depends on itself or on a task in a later wave
//! - dependencies among tasks of the same wave form no cycle

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use crate::errors::TaskListError;
use crate::state::Task;

/// One task as written by the decomposition phase.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TaskEntry {
    pub id: String,
    pub description: String,
    #[serde(default = "default_agent")]
    pub agent: String,
    pub wave: u32,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default = "default_true")]
    pub new_tests_required: bool,
}

fn default_agent() -> String {
    "implementer".to_string()
}

fn default_true() -> bool {
    true
}

impl TaskEntry {
    pub fn into_task(self) -> Task {
        Task::new(&self.id, &self.description, &self.agent, self.wave)
            .with_depends_on(self.depends_on)
            .with_new_tests_required(self.new_tests_required)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskFile {
    Wrapped { tasks: Vec<TaskEntry> },
    Bare(Vec<TaskEntry>),
}

/// Parse a task list from JSON or YAML text.
///
/// Accepts either a bare list or a document with a top-level `tasks` key.
pub fn parse_task_list(content: &str) -> Result<Vec<TaskEntry>> {
    let trimmed = content.trim_start();
    let file: TaskFile = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(content).context("Failed to parse task list as JSON")?
    } else {
        serde_yaml::from_str(content).context("Failed to parse task list as YAML")?
    };
    Ok(match file {
        TaskFile::Wrapped { tasks } => tasks,
        TaskFile::Bare(tasks) => tasks,
    })
}

/// Read and parse a task list file.
pub fn load_task_list(path: &Path) -> Result<Vec<TaskEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read task list: {}", path.display()))?;
    parse_task_list(&content).with_context(|| format!("Invalid task list: {}", path.display()))
}

/// Validate dependency structure and return the tasks ready to store.
pub fn validate_tasks(tasks: &[Task]) -> Result<(), TaskListError> {
    if tasks.is_empty() {
        return Err(TaskListError::Empty);
    }

    let mut waves: HashMap<&str, u32> = HashMap::new();
    for task in tasks {
        if waves.insert(task.id.as_str(), task.wave).is_some() {
            return Err(TaskListError::DuplicateId {
                id: task.id.clone(),
            });
        }
    }

    for task in tasks {
        for dep in &task.depends_on {
            if dep == &task.id {
                return Err(TaskListError::SelfDependency {
                    task: task.id.clone(),
                });
            }
            let dep_wave = *waves
                .get(dep.as_str())
                .ok_or_else(|| TaskListError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                })?;
            if dep_wave > task.wave {
                return Err(TaskListError::ForwardDependency {
                    task: task.id.clone(),
                    task_wave: task.wave,
                    dependency: dep.clone(),
                    dependency_wave: dep_wave,
                });
            }
        }
    }

    let mut by_wave: BTreeMap<u32, Vec<&Task>> = BTreeMap::new();
    for task in tasks {
        by_wave.entry(task.wave).or_default().push(task);
    }
    for (wave, members) in by_wave {
        validate_no_cycles(wave, &members)?;
    }

    Ok(())
}

/// Kahn's algorithm over the same-wave dependency edges.
fn validate_no_cycles(wave: u32, tasks: &[&Task]) -> Result<(), TaskListError> {
    let ids: BTreeSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in tasks {
        let same_wave: Vec<&str> = task
            .depends_on
            .iter()
            .map(String::as_str)
            .filter(|d| ids.contains(d))
            .collect();
        in_degree.insert(task.id.as_str(), same_wave.len());
        for dep in same_wave {
            dependents.entry(dep).or_default().push(task.id.as_str());
        }
    }

    let mut queue: Vec<&str> = in_degree
        .iter()
        .filter(|&(_, deg)| *deg == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut processed = 0;

    while let Some(node) = queue.pop() {
        processed += 1;
        for &dependent in dependents.get(node).map_or(&[][..], |v| v.as_slice()) {
            if let Some(deg) = in_degree.get_mut(dependent) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push(dependent);
                }
            }
        }
    }

    if processed != tasks.len() {
        let mut stuck: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, deg)| *deg > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        stuck.sort();
        return Err(TaskListError::Cycle { wave, tasks: stuck });
    }

    Ok(())
}
