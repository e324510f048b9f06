//! Code quality agent
//!
//! Style and maintainability checks: leftover debug output, unresolved
//! markers, overlong lines and oversized files.

use super::rules::{self, LineRule};
use super::scan::SourceFile;
use super::{analysis_root, scan, EventEmitter};
use crate::agent::runtime::{A2AAgent, RequestContext};
use crate::config::ScannerSection;
use crate::error::AgentError;
use crate::protocol::{
    message_types, AgentType, CodeAnalysisPayload, Finding, MessagePayload, Request, Response,
    Severity,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use tracing::info;

pub const CODE_QUALITY_ID: &str = "code-quality";

pub const MAX_LINE_LENGTH: usize = 120;
pub const MAX_FILE_LINES: usize = 500;

static QUALITY_RULES: Lazy<Vec<LineRule>> = Lazy::new(|| {
    vec![
        LineRule::new(
            "debug-output",
            Severity::Low,
            r"\b(println!|print!|eprintln!|dbg!|console\.log|System\.out\.print(ln)?)\s*\(",
            "debug output left in code",
            Some("use the logging framework"),
        ),
        LineRule::new(
            "unresolved-marker",
            Severity::Info,
            r"\b(TODO|FIXME|XXX)\b",
            "unresolved TODO/FIXME marker",
            None,
        ),
        LineRule::new(
            "trailing-whitespace",
            Severity::Info,
            r"[ \t]+$",
            "trailing whitespace",
            Some("run the formatter"),
        ),
    ]
});

/// Rule findings plus line-length and file-length checks for one file
pub fn analyze_file(file: &SourceFile) -> Vec<Finding> {
    let mut findings = rules::apply_rules(&QUALITY_RULES, file);

    let mut line_count = 0;
    for (index, line) in file.content.lines().enumerate() {
        line_count += 1;
        if line.chars().count() > MAX_LINE_LENGTH {
            findings.push(
                Finding::new(
                    &file.path,
                    u32::try_from(index + 1).unwrap_or(u32::MAX),
                    Severity::Low,
                    "long-line",
                    format!("line longer than {MAX_LINE_LENGTH} characters"),
                )
                .with_suggestion("wrap or extract a variable"),
            );
        }
    }

    if line_count > MAX_FILE_LINES {
        findings.push(
            Finding::new(
                &file.path,
                1,
                Severity::Medium,
                "large-file",
                format!("file has {line_count} lines (limit {MAX_FILE_LINES})"),
            )
            .with_suggestion("split the file into smaller modules"),
        );
    }

    findings.sort_by_key(|f| f.line);
    findings
}

pub struct CodeQualityAgent {
    agent_id: String,
    config: ScannerSection,
    events: EventEmitter,
}

impl CodeQualityAgent {
    pub fn new(config: ScannerSection, events: EventEmitter) -> Self {
        Self {
            agent_id: CODE_QUALITY_ID.to_string(),
            config,
            events,
        }
    }
}

#[async_trait]
impl A2AAgent for CodeQualityAgent {
    fn a2a_agent_id(&self) -> &str {
        &self.agent_id
    }

    fn agent_type(&self) -> AgentType {
        AgentType::CodeQuality
    }

    fn supported_message_types(&self) -> Vec<String> {
        vec![message_types::CODE_QUALITY_REQUEST.to_string()]
    }

    fn published_event_types(&self) -> Vec<String> {
        vec![message_types::ANALYSIS_COMPLETED.to_string()]
    }

    async fn handle_request(
        &self,
        request: &Request,
        _ctx: &RequestContext,
    ) -> Result<Option<Response>, AgentError> {
        if request.message_type != message_types::CODE_QUALITY_REQUEST {
            return Ok(None);
        }

        let root = scan::resolve_root(analysis_root(&request.payload)?)?;
        let sources = rules::load_sources(root, &self.config).await?;
        let findings: Vec<Finding> = sources.iter().flat_map(analyze_file).collect();

        let summary = rules::summarize(&findings, sources.len());
        info!("Quality analysis: {}", summary);

        let payload = MessagePayload::CodeAnalysis(CodeAnalysisPayload { findings, summary });
        self.events
            .emit(message_types::ANALYSIS_COMPLETED, payload.clone(), false);
        Ok(Some(Response::success(&self.agent_id, &request.id, payload)))
    }
}
