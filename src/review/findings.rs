//! Review collaborator output.
//!
//! The reviewer reports one finding per line, tagged with a severity:
//! `CRITICAL:` and `HIGH:` block the wave, `ADVISORY:`, `MEDIUM:` and `LOW:`
//! are recorded but do not. A reviewer that found nothing says
//! `FINDINGS: NONE`.

use regex::Regex;
use std::sync::LazyLock;

use crate::state::{ReviewStatus, Task};

static FINDING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*]\s+)?\**(CRITICAL|HIGH|ADVISORY|MEDIUM|LOW)\**\s*:\s*(.*?)\s*$")
        .unwrap()
});

static NO_FINDINGS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*(?:FINDINGS:\s*NONE|NO_FINDINGS)\s*$").unwrap()
});

/// Findings parsed from one review.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewFindings {
    pub critical: Vec<String>,
    pub advisory: Vec<String>,
    /// Whether any recognisable marker was present
    pub markers_found: bool,
}

impl ReviewFindings {
    pub fn status(&self) -> ReviewStatus {
        if !self.markers_found {
            ReviewStatus::EvidenceCaptureFailed
        } else if !self.critical.is_empty() {
            ReviewStatus::Blocked
        } else {
            ReviewStatus::Passed
        }
    }

    /// Replace the task's review outcome with these findings.
    pub fn apply_to(&self, task: &mut Task) {
        task.review_status = self.status();
        task.critical_findings = self.critical.clone();
        task.advisory_findings = self.advisory.clone();
    }
}

pub fn parse_review(output: &str) -> ReviewFindings {
    let mut findings = ReviewFindings {
        markers_found: NO_FINDINGS_REGEX.is_match(output),
        ..Default::default()
    };

    for cap in FINDING_REGEX.captures_iter(output) {
        let (Some(severity), Some(text)) = (cap.get(1), cap.get(2)) else {
            continue;
        };
        findings.markers_found = true;
        let text = text.as_str().to_string();
        if text.is_empty() {
            continue;
        }
        match severity.as_str() {
            "CRITICAL" | "HIGH" => findings.critical.push(text),
            _ => findings.advisory.push(text),
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_findings() {
        let output = "\
Review of T003

- CRITICAL: token written to logs in auth.rs:42
* HIGH: missing input validation on /login
ADVISORY: consider extracting helper
**MEDIUM**: long function
LOW: typo in comment
Some trailing prose.
";
        let findings = parse_review(output);
        assert_eq!(
            findings.critical,
            vec![
                "token written to logs in auth.rs:42",
                "missing input validation on /login"
            ]
        );
        assert_eq!(findings.advisory.len(), 3);
        assert_eq!(findings.status(), ReviewStatus::Blocked);
    }

    #[test]
    fn test_advisory_only_passes() {
        let findings = parse_review("ADVISORY: rename variable");
        assert_eq!(findings.status(), ReviewStatus::Passed);
    }

    #[test]
    fn test_explicit_no_findings_passes() {
        let findings = parse_review("Looked at everything.\nFINDINGS: NONE\n");
        assert!(findings.markers_found);
        assert_eq!(findings.status(), ReviewStatus::Passed);
    }

    #[test]
    fn test_no_markers_is_capture_failure() {
        let findings = parse_review("Looks good to me, critical path is fine.");
        assert_eq!(findings.status(), ReviewStatus::EvidenceCaptureFailed);
        assert_eq!(parse_review("").status(), ReviewStatus::EvidenceCaptureFailed);
    }

    #[test]
    fn test_apply_replaces_previous_review() {
        let mut task = Task::new("T1", "x", "implementer", 1);
        parse_review("CRITICAL: a\nCRITICAL: b").apply_to(&mut task);
        assert_eq!(task.critical_findings.len(), 2);

        parse_review("LOW: nit").apply_to(&mut task);
        assert_eq!(task.review_status, ReviewStatus::Passed);
        assert!(task.critical_findings.is_empty());
        assert_eq!(task.advisory_findings, vec!["nit"]);
    }
}
