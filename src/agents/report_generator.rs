//! Report generator agent
//!
//! Builds the comprehensive report by aggregating the scanner and both
//! analyzers, and renders reports on request.

use super::{analysis_root, EventEmitter};
use crate::agent::runtime::{A2AAgent, RequestContext};
use crate::aggregation::{AggregationTarget, Aggregator, ComprehensiveReport};
use crate::bus::WeakMessageBus;
use crate::config::{ReportSection, ScoringWeights};
use crate::error::AgentError;
use crate::protocol::{
    message_types, AgentType, CustomPayload, Finding, MessagePayload, ProjectStructurePayload,
    Request, Response, Severity,
};
use crate::render::{self, ReportFormat};
use async_trait::async_trait;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

pub const REPORT_GENERATOR_ID: &str = "report-generator";
pub const RENDERED_REPORT_PAYLOAD_TYPE: &str = "rendered_report";

fn is_test_path(path: &str) -> bool {
    path.split('/').any(|segment| {
        let segment = segment.to_ascii_lowercase();
        segment == "test"
            || segment == "tests"
            || segment.contains("_test")
            || segment.contains("test_")
            || segment.contains(".test.")
            || segment.contains(".spec.")
            || segment.ends_with("test.kt")
            || segment.ends_with("tests.kt")
    })
}

/// Project-level findings derived from the file layout
pub fn project_findings(structure: &ProjectStructurePayload) -> Vec<Finding> {
    let mut findings = Vec::new();

    let has_readme = structure
        .files
        .iter()
        .filter(|path| !path.contains('/'))
        .any(|path| path.to_ascii_lowercase().starts_with("readme"));
    if !has_readme {
        findings.push(
            Finding::new(
                "README.md",
                0,
                Severity::Low,
                "missing-readme",
                "project has no README",
            )
            .with_suggestion("document how to build and run the project"),
        );
    }

    let has_tests = structure.files.iter().any(|path| is_test_path(path));
    if !has_tests {
        findings.push(
            Finding::new(
                ".",
                0,
                Severity::Medium,
                "missing-tests",
                "no test files found",
            )
            .with_suggestion("add unit or integration tests"),
        );
    }

    findings
}

pub struct ReportGeneratorAgent {
    agent_id: String,
    bus: WeakMessageBus,
    report: ReportSection,
    weights: ScoringWeights,
    events: EventEmitter,
}

impl ReportGeneratorAgent {
    pub fn new(
        bus: WeakMessageBus,
        report: ReportSection,
        weights: ScoringWeights,
        events: EventEmitter,
    ) -> Self {
        Self {
            agent_id: REPORT_GENERATOR_ID.to_string(),
            bus,
            report,
            weights,
            events,
        }
    }

    async fn comprehensive_report(&self, request: &Request) -> Result<Response, AgentError> {
        let root = analysis_root(&request.payload)?.to_string();
        let bus = self
            .bus
            .upgrade()
            .ok_or_else(|| AgentError::internal_error("message bus is no longer running"))?;

        let aggregator = Aggregator::new(
            bus,
            &self.agent_id,
            Duration::from_millis(self.report.aggregation_timeout_ms),
        );
        let targets = vec![
            AggregationTarget::new(
                AgentType::ProjectScanner,
                message_types::PROJECT_SCAN_REQUEST,
                request.payload.clone(),
            ),
            AggregationTarget::new(
                AgentType::BugDetection,
                message_types::BUG_ANALYSIS_REQUEST,
                request.payload.clone(),
            ),
            AggregationTarget::new(
                AgentType::CodeQuality,
                message_types::CODE_QUALITY_REQUEST,
                request.payload.clone(),
            ),
        ];

        let outcomes = aggregator.collect(targets).await;

        let own_findings = outcomes
            .iter()
            .find_map(|o| o.project_structure())
            .map(project_findings)
            .unwrap_or_default();

        let report = ComprehensiveReport::build(root, &outcomes, own_findings, &self.weights);
        if !report.is_complete() {
            warn!("Report {} is incomplete", report.report_id);
        }
        info!("Report {} score {}", report.report_id, report.score);

        let payload = report.to_payload()?;
        self.events
            .emit(message_types::COMPREHENSIVE_REPORT_READY, payload.clone(), true);

        let mut response = Response::success(&self.agent_id, &request.id, payload);
        for (key, value) in &report.metadata {
            response = response.with_metadata(key, value);
        }
        Ok(response)
    }

    fn render_report(&self, request: &Request) -> Result<Response, AgentError> {
        let custom = request.payload.as_custom()?;
        let report = ComprehensiveReport::from_value(custom.require("report")?.clone())?;
        let format = match custom.data.get("format").and_then(|v| v.as_str()) {
            Some(name) => ReportFormat::from_str(name)?,
            None => ReportFormat::from_str(&self.report.default_format)?,
        };

        let content = render::render(&report, format)?;
        Ok(Response::success(
            &self.agent_id,
            &request.id,
            MessagePayload::Custom(
                CustomPayload::new(RENDERED_REPORT_PAYLOAD_TYPE)
                    .with("format", format.as_str())
                    .with("content", content),
            ),
        ))
    }
}

#[async_trait]
impl A2AAgent for ReportGeneratorAgent {
    fn a2a_agent_id(&self) -> &str {
        &self.agent_id
    }

    fn agent_type(&self) -> AgentType {
        AgentType::ReportGenerator
    }

    fn supported_message_types(&self) -> Vec<String> {
        vec![
            message_types::COMPREHENSIVE_REPORT_REQUEST.to_string(),
            message_types::REPORT_RENDER_REQUEST.to_string(),
        ]
    }

    fn published_event_types(&self) -> Vec<String> {
        vec![message_types::COMPREHENSIVE_REPORT_READY.to_string()]
    }

    fn max_concurrent_messages(&self) -> usize {
        2
    }

    async fn handle_request(
        &self,
        request: &Request,
        _ctx: &RequestContext,
    ) -> Result<Option<Response>, AgentError> {
        match request.message_type.as_str() {
            message_types::COMPREHENSIVE_REPORT_REQUEST => {
                self.comprehensive_report(request).await.map(Some)
            }
            message_types::REPORT_RENDER_REQUEST => self.render_report(request).map(Some),
            _ => Ok(None),
        }
    }
}
