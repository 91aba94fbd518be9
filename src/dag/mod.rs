//! Task dependency ordering.
//!
//! Tasks are grouped into numbered waves. Wave numbers may be sparse; the
//! wave after `n` is the smallest declared wave greater than `n`.

mod builder;

pub use builder::{TaskEntry, load_task_list, parse_task_list, validate_tasks};

use std::collections::BTreeSet;

use crate::state::{TaskGraph, TaskStatus};

/// The smallest wave number strictly greater than `current`.
pub fn next_wave(waves: &BTreeSet<u32>, current: u32) -> Option<u32> {
    waves
        .range((std::ops::Bound::Excluded(current), std::ops::Bound::Unbounded))
        .next()
        .copied()
}

/// The first declared wave.
pub fn first_wave(waves: &BTreeSet<u32>) -> Option<u32> {
    waves.first().copied()
}

/// Dependencies of `task_id` that do not yet allow it to start.
///
/// A dependency is satisfied once completed. A dependency in the same wave is
/// also satisfied once implemented, since the wave gate only completes tasks
/// after the whole wave has been implemented.
pub fn unsatisfied_dependencies(graph: &TaskGraph, task_id: &str) -> Vec<String> {
    let Some(task) = graph.task(task_id) else {
        return Vec::new();
    };

    task.depends_on
        .iter()
        .filter(|dep| match graph.task(dep) {
            Some(d) if d.status == TaskStatus::Completed => false,
            Some(d) if d.wave == task.wave && d.status == TaskStatus::Implemented => false,
            _ => true,
        })
        .cloned()
        .collect()
}
