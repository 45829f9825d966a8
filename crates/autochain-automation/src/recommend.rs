//! Static workflow advice per context type.

use autochain_core::ContextType;

/// Suggested follow-up workflows for `context_type`; empty when there is
/// no advice for that type.
pub fn recommendations_for(context_type: ContextType) -> &'static [&'static str] {
    match context_type {
        ContextType::TestFailure => &[
            "Consider adding retry logic with delay",
            "Add notification to team chat",
            "Automatically run specific failed tests only",
            "Check for flaky test patterns",
        ],
        ContextType::GitCommit => &[
            "Run full test suite",
            "Trigger build and deployment pipeline",
            "Update documentation if needed",
            "Run security scans",
        ],
        ContextType::BuildFailure => &[
            "Retry build with clean cache",
            "Check dependency updates",
            "Run diagnostic commands",
            "Rollback to last known good state",
        ],
        _ => &[],
    }
}
