//! Bug detection agent
//!
//! Flags lines that are likely to crash or leak at runtime using shallow
//! per-line patterns.

use super::rules::{self, LineRule};
use super::{analysis_root, scan, EventEmitter};
use crate::agent::runtime::{A2AAgent, RequestContext};
use crate::config::ScannerSection;
use crate::error::AgentError;
use crate::protocol::{
    message_types, AgentType, CodeAnalysisPayload, MessagePayload, Request, Response, Severity,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use tracing::{debug, info};

pub const BUG_DETECTION_ID: &str = "bug-detector";

static BUG_RULES: Lazy<Vec<LineRule>> = Lazy::new(|| {
    vec![
        LineRule::new(
            "unchecked-unwrap",
            Severity::Medium,
            r"\.unwrap\(\)",
            "unwrap() panics on None or Err",
            Some("propagate the error with `?` or handle the failure case"),
        ),
        LineRule::new(
            "explicit-panic",
            Severity::High,
            r"\b(panic|unimplemented|todo)!\s*\(",
            "explicit panic in reachable code",
            Some("return an error instead of panicking"),
        ),
        LineRule::new(
            "not-null-assertion",
            Severity::Medium,
            r"[\w\)\]]!!",
            "not-null assertion throws on null",
            Some("use a safe call or an explicit null check"),
        ),
        LineRule::new(
            "empty-catch",
            Severity::High,
            r"catch\s*\([^)]*\)\s*\{\s*\}",
            "exception swallowed by an empty catch block",
            Some("log or rethrow the exception"),
        ),
        LineRule::new(
            "hardcoded-secret",
            Severity::Critical,
            r#"(?i)\b(password|passwd|secret|api_?key)\s*[:=]\s*"[^"]+""#,
            "credential hardcoded in source",
            Some("load secrets from the environment or a secret store"),
        ),
        LineRule::new(
            "unsafe-block",
            Severity::High,
            r"\bunsafe\s*\{",
            "unsafe block bypasses memory-safety checks",
            Some("document the invariant or use a safe abstraction"),
        ),
        LineRule::new(
            "dynamic-eval",
            Severity::Critical,
            r"\beval\s*\(",
            "dynamic code evaluation",
            None,
        ),
    ]
});

pub struct BugDetectionAgent {
    agent_id: String,
    config: ScannerSection,
    events: EventEmitter,
}

impl BugDetectionAgent {
    pub fn new(config: ScannerSection, events: EventEmitter) -> Self {
        Self {
            agent_id: BUG_DETECTION_ID.to_string(),
            config,
            events,
        }
    }
}

#[async_trait]
impl A2AAgent for BugDetectionAgent {
    fn a2a_agent_id(&self) -> &str {
        &self.agent_id
    }

    fn agent_type(&self) -> AgentType {
        AgentType::BugDetection
    }

    fn supported_message_types(&self) -> Vec<String> {
        vec![message_types::BUG_ANALYSIS_REQUEST.to_string()]
    }

    fn published_event_types(&self) -> Vec<String> {
        vec![message_types::ANALYSIS_COMPLETED.to_string()]
    }

    async fn handle_request(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> Result<Option<Response>, AgentError> {
        if request.message_type != message_types::BUG_ANALYSIS_REQUEST {
            return Ok(None);
        }

        let root = scan::resolve_root(analysis_root(&request.payload)?)?;
        let sources = rules::load_sources(root, &self.config).await?;

        let mut findings = Vec::new();
        for file in &sources {
            if ctx.is_cancelled() {
                debug!("Caller gave up, stopping bug analysis early");
                break;
            }
            findings.extend(rules::apply_rules(&BUG_RULES, file));
        }

        let summary = rules::summarize(&findings, sources.len());
        info!("Bug analysis: {}", summary);

        let payload = MessagePayload::CodeAnalysis(CodeAnalysisPayload { findings, summary });
        self.events
            .emit(message_types::ANALYSIS_COMPLETED, payload.clone(), false);
        Ok(Some(Response::success(&self.agent_id, &request.id, payload)))
    }
}
