//! Evidence scoring over extracted transcript content.
//!
//! - [`locate_task_id`]: which task a transcript belongs to
//! - [`score_test_output`]: framework-signature test verdicts
//! - [`verify_new_tests`]: new test declarations backed by assertions

mod new_tests;
mod test_pass;

pub use new_tests::{NewTestVerdict, verify_new_tests};
pub use test_pass::{FrameworkSignature, TestVerdict, score_test_output, signatures};

use regex::Regex;
use std::sync::LazyLock;

// "TASK_ID: T004", "task id = auth-2", "Task-ID:T1"
static TASK_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btask[_ \-]?id\s*[:=]\s*`?([A-Za-z0-9][A-Za-z0-9_.\-]*)").unwrap()
});

/// First task identifier embedded in the transcript text, if any.
pub fn locate_task_id(text: &str) -> Option<String> {
    TASK_ID_REGEX
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', '-']).to_string())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_task_id_variants() {
        assert_eq!(locate_task_id("Implement TASK_ID: T004 now"), Some("T004".to_string()));
        assert_eq!(locate_task_id("task id = auth-2."), Some("auth-2".to_string()));
        assert_eq!(locate_task_id("Task-ID:`T1`"), Some("T1".to_string()));
    }

    #[test]
    fn test_locate_task_id_first_occurrence_wins() {
        let text = "TASK_ID: T010\n...\nsee also TASK_ID: T011";
        assert_eq!(locate_task_id(text), Some("T010".to_string()));
    }

    #[test]
    fn test_locate_task_id_absent() {
        assert_eq!(locate_task_id("I wrote some code and ran the tests."), None);
        assert_eq!(locate_task_id("subtask identifier pending"), None);
    }
}
