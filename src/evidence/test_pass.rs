//! Test-pass scoring by framework signature.
//!
//! A signature is a success marker plus an optional failure marker. A
//! signature matches when its success marker is present and its failure
//! marker is absent. Signatures are tried in order and the first one whose
//! success marker appears decides the verdict: a vetoed signature fails the
//! output outright rather than letting a more generic signature pass it.

use regex::Regex;
use std::sync::LazyLock;

/// One test framework's output signature.
#[derive(Debug)]
pub struct FrameworkSignature {
    pub name: &'static str,
    success: Regex,
    failure: Option<Regex>,
}

impl FrameworkSignature {
    fn new(name: &'static str, success: &str, failure: Option<&str>) -> Self {
        Self {
            name,
            success: Regex::new(success).unwrap(),
            failure: failure.map(|f| Regex::new(f).unwrap()),
        }
    }

    /// Verdict for output carrying this signature's success marker.
    fn check(&self, output: &str) -> Option<TestVerdict> {
        let found = self.success.find(output)?;
        let veto = self.failure.as_ref().and_then(|f| f.find(output));
        Some(match veto {
            Some(veto) => TestVerdict {
                passed: false,
                evidence: format!(
                    "{}: {} vetoed by {}",
                    self.name,
                    found.as_str().trim(),
                    veto.as_str().trim()
                ),
            },
            None => TestVerdict {
                passed: true,
                evidence: format!("{}: {}", self.name, found.as_str().trim()),
            },
        })
    }
}

// More specific formats come before generic "N passed" ones.
static SIGNATURES: LazyLock<Vec<FrameworkSignature>> = LazyLock::new(|| {
    vec![
        FrameworkSignature::new(
            "maven",
            r"Tests run:\s*[1-9]\d*,\s*Failures:\s*0,\s*Errors:\s*0",
            Some(r"Failures:\s*[1-9]|Errors:\s*[1-9]|BUILD FAILURE"),
        ),
        FrameworkSignature::new(
            "gradle",
            r"BUILD SUCCESSFUL",
            Some(r"BUILD FAILED|\d+ tests? completed, [1-9]\d* failed"),
        ),
        FrameworkSignature::new(
            "cargo",
            r"test result: ok\. [1-9]\d* passed",
            Some(r"test result: FAILED|error: could not compile"),
        ),
        FrameworkSignature::new(
            "go",
            r"(?m)^ok\s+\S+",
            Some(r"(?m)^(?:FAIL|--- FAIL)"),
        ),
        FrameworkSignature::new(
            "jest",
            r"(?m)^Tests:\s+.*\b[1-9]\d* passed",
            Some(r"(?m)^Tests:\s+.*\b[1-9]\d* failed"),
        ),
        FrameworkSignature::new(
            "vitest",
            r"(?m)^\s*Tests\s+[1-9]\d* passed",
            Some(r"(?m)^\s*Tests\s+.*\b[1-9]\d* failed"),
        ),
        FrameworkSignature::new(
            "mocha",
            r"\b[1-9]\d* passing\b",
            Some(r"\b[1-9]\d* failing\b"),
        ),
        FrameworkSignature::new(
            "rspec",
            r"\b[1-9]\d* examples?, 0 failures\b",
            Some(r"\b[1-9]\d* failures?\b"),
        ),
        FrameworkSignature::new(
            "dotnet",
            r"Passed!\s+-\s+Failed:\s+0\b",
            Some(r"Failed!\s+-"),
        ),
        FrameworkSignature::new(
            "phpunit",
            r"OK \([1-9]\d* tests?",
            Some(r"FAILURES!|ERRORS!"),
        ),
        FrameworkSignature::new(
            "exunit",
            r"\b[1-9]\d* tests?, 0 failures\b",
            Some(r"\b[1-9]\d* failures?\b"),
        ),
        FrameworkSignature::new(
            "pytest",
            r"\b[1-9]\d* passed\b",
            Some(r"\b[1-9]\d* (?:failed|errors?)\b"),
        ),
    ]
});

/// The signature library, in priority order.
pub fn signatures() -> &'static [FrameworkSignature] {
    &SIGNATURES
}

/// Test verdict with the justification that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestVerdict {
    pub passed: bool,
    /// Which signature matched and the marker text (plus the failure
    /// marker when vetoed); empty when no success marker appeared
    pub evidence: String,
}

/// Score test-runner output. No matching signature means not passed.
pub fn score_test_output(output: &str) -> TestVerdict {
    if output.trim().is_empty() {
        return TestVerdict::default();
    }

    SIGNATURES
        .iter()
        .find_map(|sig| sig.check(output))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maven_success_and_failure() {
        let pass = score_test_output("BUILD SUCCESS\nTests run: 10, Failures: 0, Errors: 0");
        assert!(pass.passed);
        assert!(pass.evidence.starts_with("maven:"));

        let fail = score_test_output("Tests run: 10, Failures: 2, Errors: 0\nBUILD FAILURE");
        assert!(!fail.passed);
        assert!(fail.evidence.is_empty());

        let mixed = score_test_output("Tests run: 4, Failures: 0, Errors: 0\nTests run: 3, Failures: 1, Errors: 0");
        assert!(!mixed.passed);
        assert!(mixed.evidence.starts_with("maven:"));
    }

    #[test]
    fn test_mocha_requires_absence_of_failing() {
        assert!(score_test_output("  12 passing (40ms)").passed);
        assert!(!score_test_output("  12 passing (40ms)\n  1 failing").passed);
    }

    #[test]
    fn test_cargo_labelled_before_generic_passed() {
        let verdict = score_test_output("test result: ok. 7 passed; 0 failed; 0 ignored");
        assert!(verdict.passed);
        assert!(verdict.evidence.starts_with("cargo:"));
        assert!(!score_test_output("test result: FAILED. 6 passed; 1 failed").passed);
    }

    #[test]
    fn test_jest_and_pytest() {
        let jest = score_test_output("Test Suites: 2 passed, 2 total\nTests:       9 passed, 9 total");
        assert_eq!(jest.evidence, "jest: Tests:       9 passed");

        let pytest = score_test_output("===== 5 passed in 0.12s =====");
        assert!(pytest.evidence.starts_with("pytest:"));
        assert!(!score_test_output("===== 4 passed, 1 failed in 0.2s =====").passed);
    }

    #[test]
    fn test_go_packages() {
        assert!(score_test_output("ok  \texample.com/pkg\t0.01s").passed);
        assert!(!score_test_output("ok  \texample.com/a\t0.01s\n--- FAIL: TestB (0.00s)\nFAIL").passed);
    }

    #[test]
    fn test_veto_stops_at_first_matching_framework() {
        // The cargo summary also reads as "3 passed" to the generic pytest signature
        let verdict = score_test_output(
            "test result: ok. 3 passed; 0 failed\nerror: could not compile `cart` due to 2 previous errors",
        );
        assert!(!verdict.passed);
        assert!(verdict.evidence.starts_with("cargo:"), "{}", verdict.evidence);
        assert!(verdict.evidence.contains("error: could not compile"));

        let mixed = score_test_output("  12 passing (40ms)\n  1 failing\n===== 12 passed =====");
        assert!(!mixed.passed);
        assert!(mixed.evidence.starts_with("mocha:"));
    }

    #[test]
    fn test_no_signature_is_not_passed() {
        assert_eq!(score_test_output(""), TestVerdict::default());
        assert!(!score_test_output("0 passing").passed);
        assert!(!score_test_output("compiling...").passed);
    }

    #[test]
    fn test_signature_names_are_unique() {
        let mut names: Vec<&str> = signatures().iter().map(|s| s.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), signatures().len());
    }
}
