//! Spec-check collaborator output.
//!
//! Line markers, any order:
//!
//! ```text
//! SPEC_CHECK_WAVE: 2
//! CRITICAL_COUNT: 1
//! HIGH_COUNT: 0
//! CRITICAL: endpoint /refund is specified but not implemented
//! MEDIUM: error codes differ from the spec table
//! VERDICT: FAIL
//! ```

use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;

use crate::state::{SpecCheck, SpecVerdict, TaskGraph};

static LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(SPEC_CHECK_WAVE|CRITICAL_COUNT|HIGH_COUNT|CRITICAL|HIGH|MEDIUM|VERDICT)\s*:\s*(.*?)\s*$")
        .unwrap()
});

fn parse_verdict(token: &str) -> SpecVerdict {
    match token.to_ascii_uppercase().as_str() {
        "PASS" => SpecVerdict::Pass,
        "WARN" => SpecVerdict::Warn,
        "FAIL" => SpecVerdict::Fail,
        _ => SpecVerdict::Unknown,
    }
}

/// Parse spec-check output. `None` when no marker is present at all.
///
/// The wave defaults to `current_wave`; missing counts default to the
/// number of listed findings.
pub fn parse_spec_check(output: &str, current_wave: u32) -> Option<SpecCheck> {
    let mut wave = None;
    let mut critical_count = None;
    let mut high_count = None;
    let mut verdict = SpecVerdict::Unknown;
    let mut critical_findings = Vec::new();
    let mut high_findings = Vec::new();
    let mut medium_findings = Vec::new();
    let mut found = false;

    for cap in LINE_REGEX.captures_iter(output) {
        let (Some(key), Some(value)) = (cap.get(1), cap.get(2)) else {
            continue;
        };
        found = true;
        let value = value.as_str();
        match key.as_str() {
            "SPEC_CHECK_WAVE" => wave = value.parse().ok(),
            "CRITICAL_COUNT" => critical_count = value.parse().ok(),
            "HIGH_COUNT" => high_count = value.parse().ok(),
            "CRITICAL" => critical_findings.push(value.to_string()),
            "HIGH" => high_findings.push(value.to_string()),
            "MEDIUM" => medium_findings.push(value.to_string()),
            "VERDICT" => verdict = parse_verdict(value),
            _ => {}
        }
    }

    if !found {
        return None;
    }

    Some(SpecCheck {
        wave: wave.unwrap_or(current_wave),
        run_at: Utc::now(),
        critical_count: critical_count.unwrap_or(critical_findings.len() as u32),
        high_count: high_count.unwrap_or(high_findings.len() as u32),
        critical_findings,
        high_findings,
        medium_findings,
        verdict,
    })
}

/// Store the check; critical issues block the wave it was run for.
pub fn record_spec_check(graph: &mut TaskGraph, check: SpecCheck) {
    if check.critical_count > 0 {
        graph.gate_mut(check.wave).blocked = true;
    }
    graph.spec_check = Some(check);
}
