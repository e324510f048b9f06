//! Line-oriented regex rules shared by the analyzers

use super::scan::{self, SourceFile};
use crate::config::ScannerSection;
use crate::error::AgentError;
use crate::protocol::{Finding, Severity};
use regex::Regex;
use std::path::PathBuf;

pub struct LineRule {
    pub category: &'static str,
    pub severity: Severity,
    pub pattern: Regex,
    pub message: &'static str,
    pub suggestion: Option<&'static str>,
}

impl LineRule {
    /// Build a rule from a pattern known to be valid
    pub fn new(
        category: &'static str,
        severity: Severity,
        pattern: &str,
        message: &'static str,
        suggestion: Option<&'static str>,
    ) -> Self {
        Self {
            category,
            severity,
            pattern: Regex::new(pattern).expect("rule pattern compiles"),
            message,
            suggestion,
        }
    }

    fn finding(&self, file: &str, line: u32) -> Finding {
        let finding = Finding::new(file, line, self.severity, self.category, self.message);
        match self.suggestion {
            Some(suggestion) => finding.with_suggestion(suggestion),
            None => finding,
        }
    }
}

/// One finding per rule per matching line; lines are 1-based
pub fn apply_rules(rules: &[LineRule], file: &SourceFile) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (index, line) in file.content.lines().enumerate() {
        let line_number = u32::try_from(index + 1).unwrap_or(u32::MAX);
        for rule in rules {
            if rule.pattern.is_match(line) {
                findings.push(rule.finding(&file.path, line_number));
            }
        }
    }
    findings
}

/// Read the sources under `root` on the blocking pool
pub async fn load_sources(
    root: PathBuf,
    config: &ScannerSection,
) -> Result<Vec<SourceFile>, AgentError> {
    let config = config.clone();
    scan::run_blocking(move || Ok(scan::read_sources(&root, &config)?)).await
}

/// "N findings in M files" plus a per-severity breakdown
pub fn summarize(findings: &[Finding], files_analyzed: usize) -> String {
    let count = |severity: Severity| findings.iter().filter(|f| f.severity == severity).count();
    format!(
        "{} findings in {} files (critical: {}, high: {}, medium: {}, low: {}, info: {})",
        findings.len(),
        files_analyzed,
        count(Severity::Critical),
        count(Severity::High),
        count(Severity::Medium),
        count(Severity::Low),
        count(Severity::Info),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_rules_reports_line_numbers() {
        let rules = vec![LineRule::new(
            "demo",
            Severity::Low,
            r"\bfoo\b",
            "foo found",
            Some("rename foo"),
        )];
        let file = SourceFile {
            path: "src/a.rs".to_string(),
            content: "let a = 1;\nfoo();\nbar();\nfoo(foo);\n".to_string(),
        };

        let findings = apply_rules(&rules, &file);

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].location(), ("src/a.rs", 2));
        assert_eq!(findings[1].line, 4);
        assert_eq!(findings[0].suggestion.as_deref(), Some("rename foo"));
    }

    #[test]
    fn test_summarize() {
        let findings = vec![
            Finding::new("a", 1, Severity::High, "x", "y"),
            Finding::new("a", 2, Severity::Low, "x", "y"),
        ];
        let summary = summarize(&findings, 3);
        assert!(summary.starts_with("2 findings in 3 files"));
        assert!(summary.contains("high: 1"));
    }
}
