//! Aggregator pattern
//!
//! Fans one request per target out over the bus concurrently, waits for every
//! call to settle, then merges findings. Each call's failure is recorded on
//! its own outcome; no single source can fail the aggregate.
//!
//! Findings reported at the same `(file, line)` by two or more distinct agent
//! types become a correlated issue carrying the highest observed severity.

use crate::aggregation_span;
use crate::bus::MessageBus;
use crate::config::ScoringWeights;
use crate::error::AgentError;
use crate::protocol::{
    AgentType, CustomPayload, ErrorCode, Finding, MessagePayload, ProjectStructurePayload, Request,
    Response, Severity,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

pub const MAX_SCORE: u32 = 100;
pub const COMPREHENSIVE_REPORT_PAYLOAD_TYPE: &str = "comprehensive_report";
pub const COLLECTION_ERROR_KEY: &str = "collection_error";

/// One fan-out call
#[derive(Debug, Clone)]
pub struct AggregationTarget {
    pub agent_type: AgentType,
    pub message_type: String,
    pub payload: MessagePayload,
}

impl AggregationTarget {
    pub fn new(
        agent_type: AgentType,
        message_type: impl Into<String>,
        payload: MessagePayload,
    ) -> Self {
        Self {
            agent_type,
            message_type: message_type.into(),
            payload,
        }
    }
}

/// How a single source settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Succeeded,
    Failed { code: String, detail: String },
    TimedOut,
    Unavailable,
}

impl SourceStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SourceStatus::Succeeded)
    }

    /// One-line note for report metadata
    pub fn note(&self) -> String {
        match self {
            SourceStatus::Succeeded => "ok".to_string(),
            SourceStatus::Failed { code, detail } => format!("failed ({code}): {detail}"),
            SourceStatus::TimedOut => "timed out".to_string(),
            SourceStatus::Unavailable => "unavailable".to_string(),
        }
    }
}

/// Result of one fan-out call
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub agent_type: AgentType,
    pub message_type: String,
    pub status: SourceStatus,
    /// Empty unless the source succeeded with a code-analysis payload
    pub findings: Vec<Finding>,
    pub payload: Option<MessagePayload>,
}

impl SourceOutcome {
    fn from_response(target: &AggregationTarget, response: Response) -> Self {
        let status = if response.success {
            SourceStatus::Succeeded
        } else {
            match response.error_code() {
                Some(ErrorCode::Timeout) => SourceStatus::TimedOut,
                Some(ErrorCode::AgentUnavailable) => SourceStatus::Unavailable,
                _ => SourceStatus::Failed {
                    code: response
                        .error
                        .clone()
                        .unwrap_or_else(|| ErrorCode::InternalError.as_str().to_string()),
                    detail: response.error_detail().unwrap_or_default().to_string(),
                },
            }
        };

        let (findings, payload) = if status.is_success() {
            let findings = match &response.payload {
                MessagePayload::CodeAnalysis(analysis) => analysis.findings.clone(),
                _ => Vec::new(),
            };
            (findings, Some(response.payload))
        } else {
            (Vec::new(), None)
        };

        Self {
            agent_type: target.agent_type,
            message_type: target.message_type.clone(),
            status,
            findings,
            payload,
        }
    }

    fn unavailable(target: &AggregationTarget) -> Self {
        Self {
            agent_type: target.agent_type,
            message_type: target.message_type.clone(),
            status: SourceStatus::Unavailable,
            findings: Vec::new(),
            payload: None,
        }
    }

    pub fn project_structure(&self) -> Option<&ProjectStructurePayload> {
        match &self.payload {
            Some(MessagePayload::ProjectStructure(structure)) => Some(structure),
            _ => None,
        }
    }
}

/// Concurrent fan-out over the bus
pub struct Aggregator {
    bus: MessageBus,
    sender_id: String,
    per_call_timeout: Duration,
}

impl Aggregator {
    pub fn new(bus: MessageBus, sender_id: impl Into<String>, per_call_timeout: Duration) -> Self {
        Self {
            bus,
            sender_id: sender_id.into(),
            per_call_timeout,
        }
    }

    /// Issue every target at once and wait for all of them to settle
    ///
    /// Outcomes come back in target order.
    pub async fn collect(&self, targets: Vec<AggregationTarget>) -> Vec<SourceOutcome> {
        let span = aggregation_span!(sender = %self.sender_id, targets = targets.len());
        let timeout_ms = u64::try_from(self.per_call_timeout.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);

        async move {
            let calls = targets.iter().map(|target| async move {
                if self
                    .bus
                    .registry()
                    .get_agents_by_type(target.agent_type)
                    .is_empty()
                {
                    debug!("No {} agent registered", target.agent_type);
                    return SourceOutcome::unavailable(target);
                }

                let request = Request::new(
                    self.sender_id.clone(),
                    target.message_type.clone(),
                    target.payload.clone(),
                )
                .with_timeout_ms(timeout_ms);
                let response = self.bus.request_response(request).await;
                SourceOutcome::from_response(target, response)
            });

            let outcomes = join_all(calls).await;

            let failed = outcomes.iter().filter(|o| !o.status.is_success()).count();
            if failed > 0 {
                warn!(
                    "{} of {} sources did not contribute",
                    failed,
                    outcomes.len()
                );
            } else {
                debug!("All {} sources contributed", outcomes.len());
            }
            outcomes
        }
        .instrument(span)
        .await
    }
}

/// A finding tagged with the agent type that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributedFinding {
    pub source: AgentType,
    #[serde(flatten)]
    pub finding: Finding,
}

/// Several independent detectors agreeing on one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedIssue {
    pub file: String,
    pub line: u32,
    pub severity: Severity,
    pub sources: Vec<AgentType>,
    pub messages: Vec<String>,
}

/// Flatten successful outcomes into attributed findings, in source order
pub fn attribute(outcomes: &[SourceOutcome]) -> Vec<AttributedFinding> {
    outcomes
        .iter()
        .flat_map(|outcome| {
            outcome.findings.iter().map(move |finding| AttributedFinding {
                source: outcome.agent_type,
                finding: finding.clone(),
            })
        })
        .collect()
}

/// Group findings by location and keep locations seen by two or more agent types
///
/// Issues are ordered by file, then line.
pub fn correlate(findings: &[AttributedFinding]) -> Vec<CorrelatedIssue> {
    let mut by_location: BTreeMap<(&str, u32), Vec<&AttributedFinding>> = BTreeMap::new();
    for attributed in findings {
        by_location
            .entry(attributed.finding.location())
            .or_default()
            .push(attributed);
    }

    by_location
        .into_iter()
        .filter_map(|((file, line), group)| {
            let sources: BTreeSet<AgentType> = group.iter().map(|a| a.source).collect();
            if sources.len() < 2 {
                return None;
            }
            let severity = group.iter().map(|a| a.finding.severity).max()?;
            Some(CorrelatedIssue {
                file: file.to_string(),
                line,
                severity,
                sources: sources.into_iter().collect(),
                messages: group.iter().map(|a| a.finding.message.clone()).collect(),
            })
        })
        .collect()
}

/// `MAX_SCORE` minus severity-weighted penalties, floored at zero
pub fn compute_score(
    own: &[Finding],
    aggregated: &[AttributedFinding],
    correlated: &[CorrelatedIssue],
    weights: &ScoringWeights,
) -> u32 {
    let finding_penalty: u64 = own
        .iter()
        .chain(aggregated.iter().map(|a| &a.finding))
        .map(|f| u64::from(weights.penalty(f.severity)))
        .sum();
    let correlated_penalty =
        u64::from(weights.correlated) * u64::try_from(correlated.len()).unwrap_or(u64::MAX);

    let total = finding_penalty.saturating_add(correlated_penalty);
    u64::from(MAX_SCORE).saturating_sub(total) as u32
}

/// Per-source line of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub agent_type: AgentType,
    pub message_type: String,
    #[serde(flatten)]
    pub status: SourceStatus,
    pub finding_count: usize,
}

/// Merged result of a comprehensive analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveReport {
    pub report_id: String,
    pub root: String,
    pub generated_at: DateTime<Utc>,
    pub project: Option<ProjectStructurePayload>,
    pub sources: Vec<SourceSummary>,
    /// Findings of the aggregating agent itself
    pub own_findings: Vec<Finding>,
    pub findings: Vec<AttributedFinding>,
    pub correlated_issues: Vec<CorrelatedIssue>,
    pub score: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ComprehensiveReport {
    /// Fold outcomes and own findings into a report
    ///
    /// Sources that did not succeed contribute nothing and are listed under
    /// `collection_error`, with a per-source note.
    pub fn build(
        root: impl Into<String>,
        outcomes: &[SourceOutcome],
        own_findings: Vec<Finding>,
        weights: &ScoringWeights,
    ) -> Self {
        let findings = attribute(outcomes);
        let correlated_issues = correlate(&findings);
        let score = compute_score(&own_findings, &findings, &correlated_issues, weights);

        let mut metadata = BTreeMap::new();
        let mut missing = Vec::new();
        for outcome in outcomes {
            metadata.insert(
                format!("source.{}", outcome.agent_type),
                outcome.status.note(),
            );
            if !outcome.status.is_success() {
                missing.push(outcome.agent_type.as_str());
            }
        }
        if !missing.is_empty() {
            metadata.insert(COLLECTION_ERROR_KEY.to_string(), missing.join(","));
        }

        let sources = outcomes
            .iter()
            .map(|o| SourceSummary {
                agent_type: o.agent_type,
                message_type: o.message_type.clone(),
                status: o.status.clone(),
                finding_count: o.findings.len(),
            })
            .collect();

        let project = outcomes
            .iter()
            .find_map(SourceOutcome::project_structure)
            .cloned();

        info!(
            "Report built: {} findings, {} correlated, score {}",
            findings.len() + own_findings.len(),
            correlated_issues.len(),
            score
        );

        Self {
            report_id: Uuid::new_v4().to_string(),
            root: root.into(),
            generated_at: Utc::now(),
            project,
            sources,
            own_findings,
            findings,
            correlated_issues,
            score,
            metadata,
        }
    }

    /// True when every source contributed
    pub fn is_complete(&self) -> bool {
        !self.metadata.contains_key(COLLECTION_ERROR_KEY)
    }

    pub fn total_findings(&self) -> usize {
        self.own_findings.len() + self.findings.len()
    }

    /// Count of own and aggregated findings per severity
    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for finding in self
            .own_findings
            .iter()
            .chain(self.findings.iter().map(|a| &a.finding))
        {
            *counts.entry(finding.severity).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_payload(&self) -> Result<MessagePayload, AgentError> {
        Ok(MessagePayload::Custom(
            CustomPayload::new(COMPREHENSIVE_REPORT_PAYLOAD_TYPE)
                .with("report", serde_json::to_value(self)?),
        ))
    }

    pub fn from_payload(payload: &MessagePayload) -> Result<Self, AgentError> {
        let custom = payload.as_custom()?;
        if custom.payload_type != COMPREHENSIVE_REPORT_PAYLOAD_TYPE {
            return Err(AgentError::validation_error(format!(
                "expected '{COMPREHENSIVE_REPORT_PAYLOAD_TYPE}' payload, got '{}'",
                custom.payload_type
            )));
        }
        Self::from_value(custom.require("report")?.clone())
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, AgentError> {
        serde_json::from_value(value)
            .map_err(|e| AgentError::validation_error(format!("malformed report: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn finding(file: &str, line: u32, severity: Severity) -> Finding {
        Finding::new(file, line, severity, "test", format!("{severity} at {file}:{line}"))
    }

    fn attributed(source: AgentType, file: &str, line: u32, severity: Severity) -> AttributedFinding {
        AttributedFinding {
            source,
            finding: finding(file, line, severity),
        }
    }

    fn outcome(agent_type: AgentType, status: SourceStatus, findings: Vec<Finding>) -> SourceOutcome {
        SourceOutcome {
            agent_type,
            message_type: "X".to_string(),
            status,
            findings,
            payload: None,
        }
    }

    #[test]
    fn test_correlate_promotes_to_max_severity() {
        let findings = vec![
            attributed(AgentType::BugDetection, "src/a.rs", 10, Severity::Low),
            attributed(AgentType::CodeQuality, "src/a.rs", 10, Severity::High),
            attributed(AgentType::CodeQuality, "src/a.rs", 11, Severity::Critical),
        ];

        let issues = correlate(&findings);

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].file, "src/a.rs");
        assert_eq!(issues[0].line, 10);
        assert_eq!(issues[0].severity, Severity::High);
        assert_eq!(
            issues[0].sources,
            vec![AgentType::BugDetection, AgentType::CodeQuality]
        );
        assert_eq!(issues[0].messages.len(), 2);
    }

    #[test]
    fn test_same_agent_type_twice_is_not_correlated() {
        let findings = vec![
            attributed(AgentType::BugDetection, "a.rs", 1, Severity::Medium),
            attributed(AgentType::BugDetection, "a.rs", 1, Severity::High),
        ];
        assert!(correlate(&findings).is_empty());
    }

    #[test]
    fn test_score_with_default_weights() {
        let weights = ScoringWeights::default();
        let own = vec![finding("README.md", 0, Severity::Low)];
        let aggregated = vec![
            attributed(AgentType::BugDetection, "a.rs", 1, Severity::High),
            attributed(AgentType::CodeQuality, "a.rs", 1, Severity::Medium),
        ];
        let correlated = correlate(&aggregated);

        // 100 - (2 + 10 + 5) - 15
        assert_eq!(compute_score(&own, &aggregated, &correlated, &weights), 68);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let weights = ScoringWeights::default();
        let own: Vec<_> = (0..20).map(|i| finding("a.rs", i, Severity::Critical)).collect();
        assert_eq!(compute_score(&own, &[], &[], &weights), 0);
    }

    #[test]
    fn test_report_records_missing_sources() {
        let outcomes = vec![
            outcome(
                AgentType::BugDetection,
                SourceStatus::Succeeded,
                vec![finding("a.rs", 3, Severity::High)],
            ),
            outcome(AgentType::CodeQuality, SourceStatus::TimedOut, Vec::new()),
            outcome(AgentType::ProjectScanner, SourceStatus::Unavailable, Vec::new()),
        ];

        let report = ComprehensiveReport::build("/tmp/p", &outcomes, Vec::new(), &ScoringWeights::default());

        assert!(!report.is_complete());
        assert_eq!(
            report.metadata.get(COLLECTION_ERROR_KEY).map(String::as_str),
            Some("CODE_QUALITY,PROJECT_SCANNER")
        );
        assert_eq!(
            report.metadata.get("source.CODE_QUALITY").map(String::as_str),
            Some("timed out")
        );
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.score, 90);
        assert!(report.project.is_none());
    }

    #[test]
    fn test_report_payload_round_trip() {
        let outcomes = vec![outcome(
            AgentType::BugDetection,
            SourceStatus::Failed {
                code: "validation_error".to_string(),
                detail: "bad".to_string(),
            },
            Vec::new(),
        )];
        let report = ComprehensiveReport::build("root", &outcomes, Vec::new(), &ScoringWeights::default());

        let payload = report.to_payload().unwrap();
        let decoded = ComprehensiveReport::from_payload(&payload).unwrap();
        assert_eq!(decoded, report);
    }

    #[test]
    fn test_from_payload_rejects_wrong_shapes() {
        assert!(matches!(
            ComprehensiveReport::from_payload(&MessagePayload::Empty),
            Err(AgentError::ValidationError { .. })
        ));
        let other = MessagePayload::Custom(CustomPayload::new("something_else"));
        assert!(ComprehensiveReport::from_payload(&other).is_err());
        let missing = MessagePayload::Custom(CustomPayload::new(COMPREHENSIVE_REPORT_PAYLOAD_TYPE));
        assert!(ComprehensiveReport::from_payload(&missing).is_err());
    }

    fn severity_strategy() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Info),
            Just(Severity::Low),
            Just(Severity::Medium),
            Just(Severity::High),
            Just(Severity::Critical),
        ]
    }

    fn source_strategy() -> impl Strategy<Value = AgentType> {
        prop_oneof![
            Just(AgentType::BugDetection),
            Just(AgentType::CodeQuality),
            Just(AgentType::VulnerabilityScanner),
        ]
    }

    fn findings_strategy() -> impl Strategy<Value = Vec<AttributedFinding>> {
        prop::collection::vec(
            (source_strategy(), 0u32..4, 0u32..4, severity_strategy()),
            0..30,
        )
        .prop_map(|items| {
            items
                .into_iter()
                .map(|(source, file, line, severity)| {
                    attributed(source, &format!("f{file}.rs"), line, severity)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_correlated_severity_is_max_of_group(findings in findings_strategy()) {
            for issue in correlate(&findings) {
                let max = findings
                    .iter()
                    .filter(|a| a.finding.file == issue.file && a.finding.line == issue.line)
                    .map(|a| a.finding.severity)
                    .max()
                    .unwrap();
                prop_assert_eq!(issue.severity, max);
                prop_assert!(issue.sources.len() >= 2);
            }
        }

        #[test]
        fn prop_score_never_exceeds_bounds(findings in findings_strategy()) {
            let correlated = correlate(&findings);
            let score = compute_score(&[], &findings, &correlated, &ScoringWeights::default());
            prop_assert!(score <= MAX_SCORE);
        }

        #[test]
        fn prop_more_findings_never_raise_score(
            findings in findings_strategy(),
            extra in severity_strategy(),
        ) {
            let weights = ScoringWeights::default();
            let base = compute_score(&[], &findings, &[], &weights);
            let own = vec![finding("extra.rs", 0, extra)];
            prop_assert!(compute_score(&own, &findings, &[], &weights) <= base);
        }
    }
}
