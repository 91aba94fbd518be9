//! Parsers for the external review and spec-check collaborators.
//!
//! Both collaborators emit line-based markers. Parsing never fails: missing
//! markers become explicit negative states.
//!
//! ## Example
//!
//! ```
//! use conductor::review::parse_review;
//! use conductor::state::ReviewStatus;
//!
//! let findings = parse_review("CRITICAL: secret in logs\nLOW: naming");
//! assert_eq!(findings.status(), ReviewStatus::Blocked);
//! assert_eq!(findings.advisory, vec!["naming"]);
//! ```

mod findings;
mod spec_check;

pub use findings::{ReviewFindings, parse_review};
pub use spec_check::{parse_spec_check, record_spec_check};
