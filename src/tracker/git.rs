use anyhow::{Context, Result};
use git2::{Diff, DiffFormat, DiffOptions, Repository, Tree};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which diff in the fallback chain produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffSource {
    /// Checkpoint (or HEAD) to working tree, limited to the files the worker touched
    TouchedFiles,
    /// Checkpoint to HEAD, for work the worker committed
    CheckpointToHead,
    /// HEAD to working tree, everything uncommitted
    Uncommitted,
    /// HEAD's parent to HEAD
    LastCommit,
}

impl fmt::Display for DiffSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiffSource::TouchedFiles => "touched files",
            DiffSource::CheckpointToHead => "checkpoint..HEAD",
            DiffSource::Uncommitted => "uncommitted changes",
            DiffSource::LastCommit => "last commit",
        };
        f.write_str(s)
    }
}

/// Unified diff text plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedDiff {
    pub source: DiffSource,
    pub text: String,
}

pub struct GitTracker {
    repo: Repository,
}

impl GitTracker {
    pub fn new(project_dir: &Path) -> Result<Self> {
        let repo = Repository::open(project_dir).context("Failed to open git repository")?;
        Ok(Self { repo })
    }

    /// Open the repository if `project_dir` is inside one.
    pub fn discover(project_dir: &Path) -> Option<Self> {
        Repository::discover(project_dir)
            .ok()
            .map(|repo| Self { repo })
    }

    /// Get the HEAD commit if it exists (returns None for unborn branches)
    fn head_commit(&self) -> Option<git2::Commit<'_>> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
    }

    /// Get current HEAD SHA (returns None for unborn branches)
    pub fn head_sha(&self) -> Option<String> {
        self.head_commit().map(|c| c.id().to_string())
    }

    fn tree_at(&self, sha: &str) -> Result<Tree<'_>> {
        let oid = git2::Oid::from_str(sha).with_context(|| format!("Invalid commit id '{}'", sha))?;
        let commit = self
            .repo
            .find_commit(oid)
            .with_context(|| format!("Commit {} not found", sha))?;
        Ok(commit.tree()?)
    }

    fn workdir_options() -> DiffOptions {
        let mut opts = DiffOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .show_untracked_content(true);
        opts
    }

    /// Repository-relative forms of the given paths; paths outside the
    /// working tree are dropped.
    fn relative_paths(&self, files: &[String]) -> Vec<PathBuf> {
        let Some(workdir) = self.repo.workdir() else {
            return Vec::new();
        };
        let canonical = workdir.canonicalize().ok();

        files
            .iter()
            .filter_map(|file| {
                let path = Path::new(file);
                if path.is_relative() {
                    return Some(path.to_path_buf());
                }
                path.strip_prefix(workdir)
                    .ok()
                    .or_else(|| canonical.as_deref().and_then(|c| path.strip_prefix(c).ok()))
                    .map(Path::to_path_buf)
            })
            .collect()
    }

    fn touched_files_diff(&self, start_sha: Option<&str>, files: &[String]) -> Result<Option<String>> {
        let paths = self.relative_paths(files);
        if paths.is_empty() {
            return Ok(None);
        }

        let base = match start_sha {
            Some(sha) => Some(self.tree_at(sha)?),
            None => self.head_commit().map(|c| c.tree()).transpose()?,
        };

        let mut opts = Self::workdir_options();
        opts.disable_pathspec_match(true);
        for path in &paths {
            opts.pathspec(path.as_path());
        }

        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(base.as_ref(), Some(&mut opts))?;
        patch_text(&diff).map(Some)
    }

    fn checkpoint_to_head_diff(&self, start_sha: Option<&str>) -> Result<Option<String>> {
        let (Some(sha), Some(head)) = (start_sha, self.head_commit()) else {
            return Ok(None);
        };
        let base = self.tree_at(sha)?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&base), Some(&head.tree()?), None)?;
        patch_text(&diff).map(Some)
    }

    fn uncommitted_diff(&self) -> Result<Option<String>> {
        let base = self.head_commit().map(|c| c.tree()).transpose()?;
        let mut opts = Self::workdir_options();
        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(base.as_ref(), Some(&mut opts))?;
        patch_text(&diff).map(Some)
    }

    fn last_commit_diff(&self) -> Result<Option<String>> {
        let Some(head) = self.head_commit() else {
            return Ok(None);
        };
        let parent_tree = match head.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&head.tree()?), None)?;
        patch_text(&diff).map(Some)
    }

    /// The first non-empty diff from the fallback chain: touched files,
    /// checkpoint to HEAD, uncommitted changes, last commit.
    ///
    /// A step that errors is logged and skipped.
    pub fn task_diff(&self, start_sha: Option<&str>, files: &[String]) -> Option<ScopedDiff> {
        let chain = [
            DiffSource::TouchedFiles,
            DiffSource::CheckpointToHead,
            DiffSource::Uncommitted,
            DiffSource::LastCommit,
        ];

        for source in chain {
            let result = match source {
                DiffSource::TouchedFiles => self.touched_files_diff(start_sha, files),
                DiffSource::CheckpointToHead => self.checkpoint_to_head_diff(start_sha),
                DiffSource::Uncommitted => self.uncommitted_diff(),
                DiffSource::LastCommit => self.last_commit_diff(),
            };
            match result {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    tracing::debug!(source = %source, bytes = text.len(), "selected task diff");
                    return Some(ScopedDiff { source, text });
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(source = %source, error = %e, "diff source unavailable"),
            }
        }
        None
    }
}

/// Render a diff as unified patch text with `+`/`-`/` ` line prefixes.
fn patch_text(diff: &Diff<'_>) -> Result<String> {
    let mut buf = Vec::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        match line.origin() {
            origin @ ('+' | '-' | ' ') => {
                buf.push(origin as u8);
                buf.extend_from_slice(line.content());
            }
            // End-of-file newline markers
            '=' | '>' | '<' => {}
            _ => buf.extend_from_slice(line.content()),
        }
        true
    })?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
