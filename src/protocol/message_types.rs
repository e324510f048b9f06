//! Well-known message and event types
//!
//! Message types route requests to agents; event types scope subscriptions.
//! Agents are free to declare others, these are the ones the built-in agents use.

/// Request a project structure scan
pub const PROJECT_SCAN_REQUEST: &str = "PROJECT_SCAN_REQUEST";
/// Request bug detection over a project or file list
pub const BUG_ANALYSIS_REQUEST: &str = "BUG_ANALYSIS_REQUEST";
/// Request code quality analysis over a project or file list
pub const CODE_QUALITY_REQUEST: &str = "CODE_QUALITY_REQUEST";
/// Request an aggregated report combining several analyzers
pub const COMPREHENSIVE_REPORT_REQUEST: &str = "COMPREHENSIVE_REPORT_REQUEST";
/// Request rendering of an aggregated report into text
pub const REPORT_RENDER_REQUEST: &str = "REPORT_RENDER_REQUEST";

/// Lifecycle status of a dispatched request (STARTED / COMPLETED / FAILED)
pub const AGENT_EXECUTION_STATUS: &str = "AGENT_EXECUTION_STATUS";
/// A project scan finished
pub const PROJECT_SCANNED: &str = "PROJECT_SCANNED";
/// A leaf analyzer produced findings
pub const ANALYSIS_COMPLETED: &str = "ANALYSIS_COMPLETED";
/// An aggregated report is available
pub const COMPREHENSIVE_REPORT_READY: &str = "COMPREHENSIVE_REPORT_READY";

/// Subscription key matching every broadcast event
pub const WILDCARD_EVENT_TYPE: &str = "*";

/// Message and event types must be non-empty and free of whitespace
pub fn is_valid_type_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_builtin_type_names_are_valid() {
        for name in [
            PROJECT_SCAN_REQUEST,
            BUG_ANALYSIS_REQUEST,
            CODE_QUALITY_REQUEST,
            COMPREHENSIVE_REPORT_REQUEST,
            REPORT_RENDER_REQUEST,
            AGENT_EXECUTION_STATUS,
            PROJECT_SCANNED,
            ANALYSIS_COMPLETED,
            COMPREHENSIVE_REPORT_READY,
            WILDCARD_EVENT_TYPE,
        ] {
            assert!(is_valid_type_name(name), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_type_names() {
        assert!(!is_valid_type_name(""));
        assert!(!is_valid_type_name("BUG ANALYSIS"));
        assert!(!is_valid_type_name("\tX"));
    }

    proptest! {
        #[test]
        fn type_names_with_whitespace_are_rejected(prefix in "[A-Z_]{0,8}", suffix in "[A-Z_]{0,8}") {
            let name = format!("{prefix} {suffix}");
            prop_assert!(!is_valid_type_name(&name));
        }
    }
}
