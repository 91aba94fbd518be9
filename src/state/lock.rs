//! Cooperative file lock guarding the state document.
//!
//! Acquisition retries with capped exponential backoff and gives up after a
//! fixed number of attempts. The lock is never stolen.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::StoreError;

/// Retry budget for lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRetry {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for LockRetry {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(250),
        }
    }
}

/// Exponential backoff, doubling up to a ceiling.
#[derive(Debug, Clone)]
struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            max,
        }
    }

    fn current(&self) -> Duration {
        self.current
    }

    fn advance(&mut self) {
        self.current = (self.current * 2).min(self.max);
    }
}

/// A lock file plus its retry policy.
#[derive(Debug, Clone)]
pub struct StateLock {
    path: PathBuf,
    retry: LockRetry,
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "failed to release state lock");
        }
    }
}

impl StateLock {
    pub fn new(path: impl Into<PathBuf>, retry: LockRetry) -> Self {
        Self {
            path: path.into(),
            retry,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock, retrying with backoff until the attempt budget runs out.
    pub fn acquire(&self) -> Result<LockGuard, StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::WriteFailed {
                path: self.path.clone(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| StoreError::WriteFailed {
                path: self.path.clone(),
                source,
            })?;

        let mut backoff = Backoff::new(self.retry.initial_backoff, self.retry.max_backoff);
        for attempt in 1..=self.retry.max_attempts {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, path = %self.path.display(), "acquired state lock after contention");
                    }
                    return Ok(LockGuard { file });
                }
                Err(e) if is_contended(&e) => {
                    tracing::debug!(attempt, wait_ms = backoff.current().as_millis() as u64, "state lock busy");
                    if attempt < self.retry.max_attempts {
                        std::thread::sleep(backoff.current());
                        backoff.advance();
                    }
                }
                Err(source) => {
                    return Err(StoreError::WriteFailed {
                        path: self.path.clone(),
                        source,
                    });
                }
            }
        }

        tracing::warn!(
            path = %self.path.display(),
            attempts = self.retry.max_attempts,
            "gave up waiting for state lock"
        );
        Err(StoreError::LockTimeout {
            path: self.path.clone(),
            attempts: self.retry.max_attempts,
        })
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fast_retry(attempts: u32) -> LockRetry {
        LockRetry {
            max_attempts: attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(25));
        assert_eq!(backoff.current(), Duration::from_millis(10));
        backoff.advance();
        assert_eq!(backoff.current(), Duration::from_millis(20));
        backoff.advance();
        assert_eq!(backoff.current(), Duration::from_millis(25));
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = tempdir().unwrap();
        let lock = StateLock::new(dir.path().join("state.lock"), fast_retry(3));
        let guard = lock.acquire().unwrap();
        drop(guard);
        // Released, so a second acquisition succeeds immediately
        lock.acquire().unwrap();
    }

    #[test]
    fn test_contended_lock_times_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.lock");
        let holder = StateLock::new(&path, fast_retry(3));
        let _held = holder.acquire().unwrap();

        let waiter = StateLock::new(&path, fast_retry(3));
        match waiter.acquire() {
            Err(StoreError::LockTimeout { attempts, path: p }) => {
                assert_eq!(attempts, 3);
                assert_eq!(p, path);
            }
            other => panic!("Expected LockTimeout, got {:?}", other),
        }
    }

    #[test]
    fn test_acquire_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/.conductor/state.lock");
        let lock = StateLock::new(&path, fast_retry(1));
        lock.acquire().unwrap();
        assert!(path.exists());
    }
}
