//! Wave gate evaluation.
//!
//! A wave may advance only when every one of its tasks is implemented and all
//! five checks pass: test evidence, new-test evidence, review completion,
//! no critical findings, and specification alignment.

use chrono::Utc;
use std::fmt;

use crate::dag::next_wave;
use crate::state::{ReviewStatus, SpecCheck, Task, TaskGraph, TaskStatus, TestsState};

/// One check in the battery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl GateCheck {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for GateCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "PASS" } else { "FAIL" };
        write!(f, "[{}] {}: {}", mark, self.name, self.detail)
    }
}

/// All checks for one wave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateReport {
    pub wave: u32,
    pub checks: Vec<GateCheck>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &GateCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    fn check(&self, name: &str) -> Option<&GateCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Result of evaluating a wave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Some tasks are not implemented yet; checks were not run
    NotReady { wave: u32, pending: Vec<String> },
    Evaluated(GateReport),
}

pub const CHECK_TESTS: &str = "tests";
pub const CHECK_NEW_TESTS: &str = "new_tests";
pub const CHECK_REVIEWS: &str = "reviews";
pub const CHECK_CRITICAL: &str = "critical_findings";
pub const CHECK_SPEC: &str = "spec_alignment";

fn ids(tasks: &[&Task]) -> String {
    tasks
        .iter()
        .map(|t| t.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn check_tests(tasks: &[&Task]) -> GateCheck {
    let failing: Vec<&Task> = tasks.iter().copied().filter(|t| !t.tests_passed).collect();
    if failing.is_empty() {
        GateCheck::pass(CHECK_TESTS, format!("{} task(s) have passing test evidence", tasks.len()))
    } else {
        GateCheck::fail(CHECK_TESTS, format!("no passing test evidence for {}", ids(&failing)))
    }
}

pub fn check_new_tests(tasks: &[&Task]) -> GateCheck {
    let missing: Vec<&Task> = tasks
        .iter()
        .copied()
        .filter(|t| t.new_tests_required && !t.new_tests_written)
        .collect();
    if missing.is_empty() {
        GateCheck::pass(CHECK_NEW_TESTS, "every task that requires new tests wrote them")
    } else {
        let detail = missing
            .iter()
            .map(|t| {
                if t.new_test_evidence.is_empty() {
                    t.id.clone()
                } else {
                    format!("{} ({})", t.id, t.new_test_evidence)
                }
            })
            .collect::<Vec<_>>()
            .join("; ");
        GateCheck::fail(CHECK_NEW_TESTS, format!("new tests missing: {}", detail))
    }
}

/// Passed and blocked both count as reviewed.
pub fn check_reviews(tasks: &[&Task]) -> GateCheck {
    let unreviewed: Vec<&Task> = tasks
        .iter()
        .copied()
        .filter(|t| t.review_status == ReviewStatus::Pending)
        .collect();
    let capture_failed: Vec<&Task> = tasks
        .iter()
        .copied()
        .filter(|t| t.review_status == ReviewStatus::EvidenceCaptureFailed)
        .collect();

    if unreviewed.is_empty() && capture_failed.is_empty() {
        return GateCheck::pass(CHECK_REVIEWS, "every task has a review outcome");
    }

    let mut problems = Vec::new();
    if !unreviewed.is_empty() {
        problems.push(format!("not reviewed: {}", ids(&unreviewed)));
    }
    if !capture_failed.is_empty() {
        problems.push(format!(
            "review evidence capture failed: {}",
            ids(&capture_failed)
        ));
    }
    GateCheck::fail(CHECK_REVIEWS, problems.join("; "))
}

pub fn check_critical_findings(tasks: &[&Task]) -> GateCheck {
    let total: usize = tasks.iter().map(|t| t.critical_findings.len()).sum();
    if total == 0 {
        return GateCheck::pass(CHECK_CRITICAL, "no critical findings");
    }
    let per_task = tasks
        .iter()
        .filter(|t| !t.critical_findings.is_empty())
        .map(|t| format!("{} ({})", t.id, t.critical_findings.len()))
        .collect::<Vec<_>>()
        .join(", ");
    GateCheck::fail(
        CHECK_CRITICAL,
        format!("{} critical finding(s): {}", total, per_task),
    )
}

/// No spec check at all passes as skipped; a check for another wave is stale.
pub fn check_spec_alignment(spec_check: Option<&SpecCheck>, wave: u32) -> GateCheck {
    match spec_check {
        None => GateCheck::pass(CHECK_SPEC, "skipped: no spec check has been run"),
        Some(check) if check.wave != wave => GateCheck::fail(
            CHECK_SPEC,
            format!(
                "stale: spec check was run for wave {}, current wave is {}",
                check.wave, wave
            ),
        ),
        Some(check) if check.critical_count > 0 => GateCheck::fail(
            CHECK_SPEC,
            format!(
                "spec check found {} critical issue(s) (verdict {})",
                check.critical_count, check.verdict
            ),
        ),
        Some(check) => GateCheck::pass(
            CHECK_SPEC,
            format!(
                "wave {} aligned: 0 critical, {} high (verdict {})",
                check.wave, check.high_count, check.verdict
            ),
        ),
    }
}

/// Evaluate the gate for `wave` without changing anything.
pub fn evaluate(graph: &TaskGraph, wave: u32) -> GateOutcome {
    let tasks: Vec<&Task> = graph.tasks_in_wave(wave).collect();

    let pending: Vec<String> = tasks
        .iter()
        .filter(|t| !t.status.is_done())
        .map(|t| t.id.clone())
        .collect();
    if tasks.is_empty() || !pending.is_empty() {
        return GateOutcome::NotReady { wave, pending };
    }

    GateOutcome::Evaluated(GateReport {
        wave,
        checks: vec![
            check_tests(&tasks),
            check_new_tests(&tasks),
            check_reviews(&tasks),
            check_critical_findings(&tasks),
            check_spec_alignment(graph.spec_check.as_ref(), wave),
        ],
    })
}

/// What advancing the current wave did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaveAdvance {
    NotReady { wave: u32, pending: Vec<String> },
    /// Checks failed; gate flags recorded, wave unchanged
    Blocked(GateReport),
    /// The wave passed and `next` became current
    Advanced { report: GateReport, next: u32 },
    /// The last wave passed; the workflow is complete
    Finished(GateReport),
}

fn record_gate(graph: &mut TaskGraph, report: &GateReport) {
    let spec_blocked = graph
        .spec_check
        .as_ref()
        .is_some_and(|c| c.wave == report.wave && c.critical_count > 0);
    let passed = |name: &str| report.check(name).is_some_and(|c| c.passed);

    let gate = graph.gate_mut(report.wave);
    gate.impl_complete = true;
    gate.tests_passed = if passed(CHECK_TESTS) {
        TestsState::Pass
    } else {
        TestsState::Fail
    };
    gate.reviews_complete = passed(CHECK_REVIEWS);
    gate.blocked = !passed(CHECK_CRITICAL) || spec_blocked;
}

/// Evaluate the current wave and, if it passes, complete its tasks and move on.
pub fn advance_wave(graph: &mut TaskGraph) -> WaveAdvance {
    let wave = graph.current_wave;
    let report = match evaluate(graph, wave) {
        GateOutcome::NotReady { wave, pending } => return WaveAdvance::NotReady { wave, pending },
        GateOutcome::Evaluated(report) => report,
    };

    record_gate(graph, &report);
    if !report.passed() {
        return WaveAdvance::Blocked(report);
    }

    for task in graph.tasks.iter_mut().filter(|t| t.wave == wave) {
        task.status = TaskStatus::Completed;
    }

    match next_wave(&graph.wave_numbers(), wave) {
        Some(next) => {
            graph.current_wave = next;
            WaveAdvance::Advanced { report, next }
        }
        None => {
            graph.completed_at = Some(Utc::now());
            WaveAdvance::Finished(report)
        }
    }
}
