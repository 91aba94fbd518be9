//! The shared state store.
//!
//! All mutation funnels through [`StateStore::update`]: it takes the lock,
//! re-reads the latest snapshot, applies the caller's change, and persists
//! with write-to-temp-then-rename. Reads outside the lock are eventually
//! consistent and must not be cached.

use chrono::Utc;
use std::path::{Path, PathBuf};

use super::graph::TaskGraph;
use super::lock::{LockRetry, StateLock};
use crate::config::Config;
use crate::errors::StoreError;
use crate::init::{lock_file_path, state_file_path};

/// Handle to the one active task graph of a project.
#[derive(Debug, Clone)]
pub struct StateStore {
    state_path: PathBuf,
    lock: StateLock,
}

impl StateStore {
    pub fn new(state_path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>, retry: LockRetry) -> Self {
        Self {
            state_path: state_path.into(),
            lock: StateLock::new(lock_path, retry),
        }
    }

    /// Store at the conventional `.conductor/` paths with the configured retry budget.
    pub fn for_project(config: &Config) -> Self {
        let retry = LockRetry {
            max_attempts: config.lock_attempts(),
            initial_backoff: config.lock_initial_backoff(),
            max_backoff: config.lock_max_backoff(),
        };
        Self::new(
            state_file_path(&config.project_dir),
            lock_file_path(&config.project_dir),
            retry,
        )
    }

    /// Path of the state document.
    pub fn path(&self) -> &Path {
        &self.state_path
    }

    /// Read the current snapshot. `None` means no workflow exists.
    pub fn load(&self) -> Result<Option<TaskGraph>, StoreError> {
        let content = match std::fs::read_to_string(&self.state_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::ReadFailed {
                    path: self.state_path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: self.state_path.clone(),
                source,
            })
    }

    /// Write a fresh graph. Refuses to replace an active one unless `force`.
    pub fn create(&self, graph: TaskGraph, force: bool) -> Result<TaskGraph, StoreError> {
        let _guard = self.lock.acquire()?;

        if !force
            && let Some(existing) = self.load()?
            && existing.is_active()
        {
            return Err(StoreError::AlreadyActive {
                path: self.state_path.clone(),
            });
        }

        self.persist(&graph)?;
        tracing::info!(run_id = %graph.run_id, feature = %graph.feature, "workflow created");
        Ok(graph)
    }

    /// Apply `f` to the latest snapshot under the lock and persist the result.
    pub fn update<F>(&self, f: F) -> Result<TaskGraph, StoreError>
    where
        F: FnOnce(&mut TaskGraph),
    {
        self.update_with(f).map(|(graph, ())| graph)
    }

    /// Like [`update`](Self::update), also returning a value computed by `f`.
    ///
    /// When `f` leaves the graph unchanged nothing is written and `updated_at`
    /// keeps its old value, so repeated no-op updates are invisible.
    pub fn update_with<F, T>(&self, f: F) -> Result<(TaskGraph, T), StoreError>
    where
        F: FnOnce(&mut TaskGraph) -> T,
    {
        let _guard = self.lock.acquire()?;

        let before = self.load()?.ok_or_else(|| StoreError::NoActiveWorkflow {
            path: self.state_path.clone(),
        })?;

        let mut graph = before.clone();
        let value = f(&mut graph);

        if graph != before {
            let stray = graph.stray_executing();
            if !stray.is_empty() {
                tracing::error!(tasks = ?stray, "update left executing tasks that are not in progress");
                return Err(StoreError::Inconsistent { tasks: stray });
            }
            graph.updated_at = Utc::now();
            self.persist(&graph)?;
            tracing::debug!(run_id = %graph.run_id, phase = %graph.current_phase, wave = graph.current_wave, "state updated");
        }

        Ok((graph, value))
    }

    /// Delete the state document under the lock, returning what was removed.
    pub fn remove(&self) -> Result<Option<TaskGraph>, StoreError> {
        let _guard = self.lock.acquire()?;

        let existing = self.load()?;
        if existing.is_some() {
            std::fs::remove_file(&self.state_path).map_err(|source| StoreError::WriteFailed {
                path: self.state_path.clone(),
                source,
            })?;
            tracing::info!(path = %self.state_path.display(), "workflow removed");
        }
        Ok(existing)
    }

    /// Write-to-temp-then-rename. Callers must hold the lock.
    fn persist(&self, graph: &TaskGraph) -> Result<(), StoreError> {
        let write_err = |source| StoreError::WriteFailed {
            path: self.state_path.clone(),
            source,
        };

        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let content = serde_json::to_string_pretty(graph).map_err(|e| StoreError::Other(e.into()))?;
        let tmp = self.state_path.with_extension("json.tmp");
        {
            use std::io::Write;
            let mut file = std::fs::File::create(&tmp).map_err(write_err)?;
            file.write_all(content.as_bytes()).map_err(write_err)?;
            file.sync_all().map_err(write_err)?;
        }
        std::fs::rename(&tmp, &self.state_path).map_err(write_err)?;
        Ok(())
    }
}
