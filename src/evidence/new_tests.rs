//! New-test verification over a unified diff.
//!
//! Only added lines count. A task has written new tests when the diff adds at
//! least one test declaration and at least one assertion; a declaration
//! without any assertion is a stub and is rejected.

use regex::Regex;
use std::sync::LazyLock;

static TEST_DECLARATIONS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Rust
        r"#\[(?:tokio::|async_std::)?test\b",
        // Python
        r"^\s*(?:async\s+)?def\s+test_?\w*\s*\(",
        // JavaScript / TypeScript
        r#"\b(?:it|test)(?:\.(?:only|each\([^)]*\)))?\s*\(\s*['"`]"#,
        // Go
        r"^\s*func\s+Test\w*\s*\(\s*\w+\s+\*testing\.T\b",
        // JVM / .NET
        r"@(?:Test|ParameterizedTest)\b",
        r"\[(?:Test|Fact|Theory|TestMethod|TestCase)\b",
        // Ruby / Elixir
        r#"^\s*(?:it|specify|test)\s+['"]"#,
        // PHP
        r"\bfunction\s+test\w+\s*\(",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static ASSERTIONS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bassert\w*!?\s*\(",
        r"^\s*assert\b",
        r"\bAssert\.\w+\s*\(",
        r"\bexpect\s*\(",
        r"\.should\b",
        r"\bt\.(?:Errorf?|Fatalf?|Fail(?:Now)?)\s*\(",
        r"\b(?:require|assert)\.\w+\s*\(",
        r"\bpytest\.raises\s*\(",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Outcome of scanning a diff for new tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTestVerdict {
    pub written: bool,
    pub tests_added: usize,
    pub assertions_added: usize,
    pub evidence: String,
}

/// Lines the diff adds, without the leading `+`. File headers are skipped.
fn added_lines(diff: &str) -> impl Iterator<Item = &str> {
    diff.lines()
        .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
        .map(|l| &l[1..])
}

pub fn verify_new_tests(diff: &str) -> NewTestVerdict {
    if diff.trim().is_empty() {
        return NewTestVerdict {
            evidence: "no diff available".to_string(),
            ..Default::default()
        };
    }

    let mut tests_added = 0;
    let mut assertions_added = 0;
    for line in added_lines(diff) {
        if TEST_DECLARATIONS.iter().any(|re| re.is_match(line)) {
            tests_added += 1;
        }
        if ASSERTIONS.iter().any(|re| re.is_match(line)) {
            assertions_added += 1;
        }
    }

    let written = tests_added > 0 && assertions_added > 0;
    let evidence = if written {
        format!(
            "{} new test declaration(s) with {} assertion(s)",
            tests_added, assertions_added
        )
    } else if tests_added > 0 {
        format!(
            "{} new test declaration(s) but 0 assertions; stubs without assertions do not count",
            tests_added
        )
    } else {
        "no new test declarations in diff".to_string()
    };

    NewTestVerdict {
        written,
        tests_added,
        assertions_added,
        evidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUST_DIFF: &str = "\
diff --git a/src/cart.rs b/src/cart.rs
--- a/src/cart.rs
+++ b/src/cart.rs
@@ -10,3 +10,9 @@
 fn total() {}
+#[test]
+fn test_total_is_zero() {
+    assert_eq!(total(), 0);
+}
";

    #[test]
    fn test_rust_test_with_assertion() {
        let verdict = verify_new_tests(RUST_DIFF);
        assert!(verdict.written);
        assert_eq!(verdict.tests_added, 1);
        assert_eq!(verdict.assertions_added, 1);
    }

    #[test]
    fn test_stub_without_assertion_rejected() {
        let diff = "\
+++ b/tests/test_cart.py
+def test_total():
+    pass
";
        let verdict = verify_new_tests(diff);
        assert!(!verdict.written);
        assert_eq!(verdict.tests_added, 1);
        assert!(verdict.evidence.contains("0 assertions"));
    }

    #[test]
    fn test_removed_and_context_lines_ignored() {
        let diff = "\
-it('old', () => { expect(a).toBe(1) })
 test('context', () => {})
+const x = 1;
";
        let verdict = verify_new_tests(diff);
        assert!(!verdict.written);
        assert_eq!(verdict.tests_added, 0);
        assert_eq!(verdict.evidence, "no new test declarations in diff");
    }

    #[test]
    fn test_js_go_and_java_declarations() {
        let diff = "\
+  it('adds items', () => {
+    expect(cart.size).toBe(1);
+func TestCart(t *testing.T) {
+    @Test
+    void addsItem() { assertEquals(1, cart.size()); }
";
        let verdict = verify_new_tests(diff);
        assert!(verdict.written);
        assert_eq!(verdict.tests_added, 3);
        assert_eq!(verdict.assertions_added, 2);
    }

    #[test]
    fn test_empty_diff() {
        let verdict = verify_new_tests("   \n");
        assert!(!verdict.written);
        assert_eq!(verdict.evidence, "no diff available");
    }
}
