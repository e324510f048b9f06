//! Report rendering
//!
//! Turns a `ComprehensiveReport` into markdown, JSON or plain text.

use crate::aggregation::ComprehensiveReport;
use crate::error::AgentError;
use crate::protocol::Severity;
use std::fmt::{self, Write};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
    Text,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "markdown",
            ReportFormat::Json => "json",
            ReportFormat::Text => "text",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "json" => Ok(ReportFormat::Json),
            "text" | "txt" => Ok(ReportFormat::Text),
            other => Err(AgentError::validation_error(format!(
                "unknown report format '{other}'"
            ))),
        }
    }
}

pub fn render(report: &ComprehensiveReport, format: ReportFormat) -> Result<String, AgentError> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        ReportFormat::Markdown => write_with(report, render_markdown),
        ReportFormat::Text => write_with(report, render_text),
    }
}

fn write_with(
    report: &ComprehensiveReport,
    render: fn(&mut String, &ComprehensiveReport) -> fmt::Result,
) -> Result<String, AgentError> {
    let mut out = String::new();
    render(&mut out, report)
        .map_err(|e| AgentError::internal_error(format!("report rendering failed: {e}")))?;
    Ok(out)
}

const SEVERITIES_DESC: [Severity; 5] = [
    Severity::Critical,
    Severity::High,
    Severity::Medium,
    Severity::Low,
    Severity::Info,
];

fn render_markdown(out: &mut String, report: &ComprehensiveReport) -> fmt::Result {
    writeln!(out, "# Analysis Report: {}", report.root)?;
    writeln!(out)?;
    writeln!(out, "**Score:** {}/100", report.score)?;
    if let Some(project) = &report.project {
        writeln!(
            out,
            "**Project:** {} ({} files)",
            project.project_type, project.total_files
        )?;
    }
    writeln!(out, "**Generated:** {}", report.generated_at.to_rfc3339())?;
    writeln!(out)?;

    writeln!(out, "## Sources")?;
    writeln!(out)?;
    writeln!(out, "| Agent | Status | Findings |")?;
    writeln!(out, "|-------|--------|----------|")?;
    for source in &report.sources {
        writeln!(
            out,
            "| {} | {} | {} |",
            source.agent_type,
            source.status.note(),
            source.finding_count
        )?;
    }
    if !report.is_complete() {
        writeln!(out)?;
        writeln!(
            out,
            "> Incomplete: some sources did not contribute. Sections from them are missing."
        )?;
    }
    writeln!(out)?;

    let counts = report.severity_counts();
    writeln!(out, "## Summary")?;
    writeln!(out)?;
    for severity in SEVERITIES_DESC {
        writeln!(
            out,
            "- {}: {}",
            severity,
            counts.get(&severity).copied().unwrap_or(0)
        )?;
    }
    writeln!(out)?;

    if !report.correlated_issues.is_empty() {
        writeln!(out, "## Correlated Issues")?;
        writeln!(out)?;
        for issue in &report.correlated_issues {
            let sources: Vec<_> = issue.sources.iter().map(|s| s.as_str()).collect();
            writeln!(
                out,
                "- **{}** `{}:{}` ({})",
                issue.severity,
                issue.file,
                issue.line,
                sources.join(", ")
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "## Findings")?;
    writeln!(out)?;
    if report.total_findings() == 0 {
        writeln!(out, "No findings.")?;
    }
    for finding in &report.own_findings {
        writeln!(
            out,
            "- **{}** `{}` {} [{}]",
            finding.severity, finding.file, finding.message, finding.category
        )?;
    }
    for attributed in &report.findings {
        let finding = &attributed.finding;
        writeln!(
            out,
            "- **{}** `{}:{}` {} [{} / {}]",
            finding.severity,
            finding.file,
            finding.line,
            finding.message,
            attributed.source,
            finding.category
        )?;
    }

    Ok(())
}

fn render_text(out: &mut String, report: &ComprehensiveReport) -> fmt::Result {
    writeln!(out, "Analysis report for {}", report.root)?;
    writeln!(out, "Score: {}/100", report.score)?;
    for source in &report.sources {
        writeln!(
            out,
            "  {:<22} {}",
            source.agent_type.as_str(),
            source.status.note()
        )?;
    }
    writeln!(
        out,
        "{} findings, {} correlated issues",
        report.total_findings(),
        report.correlated_issues.len()
    )?;
    for issue in &report.correlated_issues {
        writeln!(
            out,
            "  [CORRELATED {}] {}:{}",
            issue.severity, issue.file, issue.line
        )?;
    }
    for finding in &report.own_findings {
        writeln!(out, "  [{}] {} {}", finding.severity, finding.file, finding.message)?;
    }
    for attributed in &report.findings {
        let finding = &attributed.finding;
        writeln!(
            out,
            "  [{}] {}:{} {}",
            finding.severity, finding.file, finding.line, finding.message
        )?;
    }
    Ok(())
}
