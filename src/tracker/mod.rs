//! Version-control evidence for new-test verification.

mod git;

pub use git::{DiffSource, GitTracker, ScopedDiff};
