//! Shared workflow state.
//!
//! [`TaskGraph`] is the single source of truth for a run. It is owned by the
//! [`StateStore`]; every other component reads a snapshot, computes a change,
//! and hands it back through [`StateStore::update`].

mod graph;
mod lock;
mod store;

pub use graph::{
    ReviewStatus, SpecCheck, SpecVerdict, Task, TaskGraph, TaskStatus, TestsState, WaveGate,
};
pub use lock::{LockGuard, LockRetry, StateLock};
pub use store::StateStore;
