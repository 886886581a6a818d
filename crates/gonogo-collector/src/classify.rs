//! Failure classification: exception kind + message -> failure category.

use gonogo_core::enums::FailureCategory;

/// Failure details as reported by the runner.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureInfo {
    /// Exception kind (e.g. `AssertionError`, `TimeoutError`).
    pub kind: String,
    /// Failure message; digested, never stored verbatim.
    pub message: String,
}

/// Ordered classifier table: the first rule whose keyword matches the
/// lowercased kind or message wins.
const RULES: &[(FailureCategory, &[&str])] = &[
    (
        FailureCategory::Timeout,
        &["timeout", "timed out", "deadline exceeded"],
    ),
    (
        FailureCategory::Flaky,
        &["flaky", "intermittent", "race condition"],
    ),
    (
        FailureCategory::Resource,
        &[
            "memoryerror",
            "oserror",
            "ioerror",
            "no space",
            "permission denied",
            "resource",
            "too many open files",
        ],
    ),
    (
        FailureCategory::Integration,
        &[
            "connectionerror",
            "connection refused",
            "httperror",
            "bad gateway",
            "service unavailable",
            "dns",
        ],
    ),
    (
        FailureCategory::Assertion,
        &["assertionerror", "assert"],
    ),
];

/// Classifies a failure. Unmatched failures fall back to `assertion`,
/// the dominant category for plain test failures.
pub fn classify_failure(kind: &str, message: &str) -> FailureCategory {
    let haystack = format!("{} {}", kind.to_lowercase(), message.to_lowercase());
    for (category, keywords) in RULES {
        if keywords.iter().any(|kw| haystack.contains(kw)) {
            return *category;
        }
    }
    FailureCategory::Assertion
}
