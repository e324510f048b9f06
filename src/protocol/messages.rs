//! Message model for agent communication
//!
//! This module defines the envelope every component speaks: requests, responses
//! and events, the payload variants they carry, and the analysis findings that
//! leaf agents produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AgentError;

/// Metadata key a caller may set to override the processing priority of one request
pub const PRIORITY_METADATA_KEY: &str = "priority";

/// Sender id used for responses synthesized by the bus itself
pub const BUS_SENDER_ID: &str = "message-bus";

/// Roles an agent can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentType {
    BugDetection,
    CodeQuality,
    ReportGenerator,
    ProjectScanner,
    VulnerabilityScanner,
    CodeReview,
}

impl AgentType {
    pub const ALL: [AgentType; 6] = [
        AgentType::BugDetection,
        AgentType::CodeQuality,
        AgentType::ReportGenerator,
        AgentType::ProjectScanner,
        AgentType::VulnerabilityScanner,
        AgentType::CodeReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::BugDetection => "BUG_DETECTION",
            AgentType::CodeQuality => "CODE_QUALITY",
            AgentType::ReportGenerator => "REPORT_GENERATOR",
            AgentType::ProjectScanner => "PROJECT_SCANNER",
            AgentType::VulnerabilityScanner => "VULNERABILITY_SCANNER",
            AgentType::CodeReview => "CODE_REVIEW",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AgentError::validation_error(format!("Unknown agent type: {s}")))
    }
}

/// Finding severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single located analysis result produced by a leaf analyzer
///
/// # Examples
/// ```
/// use a2a_analyzer::protocol::{Finding, Severity};
///
/// let finding = Finding::new("src/main.rs", 42, Severity::High, "panic", "explicit panic")
///     .with_suggestion("return an error instead");
/// assert_eq!(finding.location(), ("src/main.rs", 42));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub file: String,
    pub line: u32,
    pub severity: Severity,
    pub category: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Finding {
    pub fn new(
        file: impl Into<String>,
        line: u32,
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            severity,
            category: category.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn location(&self) -> (&str, u32) {
        (&self.file, self.line)
    }
}

/// Lifecycle status published around every dispatched request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Started,
    Completed,
    Failed,
}

/// Protocol error codes surfaced through `Response::error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnsupportedType,
    AgentUnavailable,
    Timeout,
    ValidationError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnsupportedType => "unsupported_type",
            ErrorCode::AgentUnavailable => "agent_unavailable",
            ErrorCode::Timeout => "timeout",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque extension payload: a named bag of dynamically-typed values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomPayload {
    #[serde(rename = "type")]
    pub payload_type: String,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

impl CustomPayload {
    pub fn new(payload_type: impl Into<String>) -> Self {
        Self {
            payload_type: payload_type.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Required string field, or a validation error naming the field
    pub fn require_str(&self, key: &str) -> Result<&str, AgentError> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AgentError::validation_error(format!(
                    "payload '{}' is missing string field '{key}'",
                    self.payload_type
                ))
            })
    }

    pub fn require(&self, key: &str) -> Result<&Value, AgentError> {
        self.data.get(key).ok_or_else(|| {
            AgentError::validation_error(format!(
                "payload '{}' is missing field '{key}'",
                self.payload_type
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatusPayload {
    pub status: ExecutionStatus,
    pub agent_id: String,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeAnalysisPayload {
    pub findings: Vec<Finding>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectStructurePayload {
    pub files: Vec<String>,
    pub directories: Vec<String>,
    pub project_type: String,
    pub total_files: usize,
    pub scanned_at: DateTime<Utc>,
}

/// Payload variants carried by requests, responses and events
///
/// Consumers match exhaustively; a shape they do not expect is a
/// `validation_error`, never silently ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePayload {
    Empty,
    Custom(CustomPayload),
    Error(ErrorPayload),
    ExecutionStatus(ExecutionStatusPayload),
    CodeAnalysis(CodeAnalysisPayload),
    ProjectStructure(ProjectStructurePayload),
}

impl MessagePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            MessagePayload::Empty => "empty",
            MessagePayload::Custom(_) => "custom",
            MessagePayload::Error(_) => "error",
            MessagePayload::ExecutionStatus(_) => "execution_status",
            MessagePayload::CodeAnalysis(_) => "code_analysis",
            MessagePayload::ProjectStructure(_) => "project_structure",
        }
    }

    /// Parse a payload from JSON; unknown variants become validation errors
    pub fn from_json(value: Value) -> Result<Self, AgentError> {
        serde_json::from_value(value)
            .map_err(|e| AgentError::validation_error(format!("Unrecognized payload: {e}")))
    }

    pub fn as_custom(&self) -> Result<&CustomPayload, AgentError> {
        match self {
            MessagePayload::Custom(custom) => Ok(custom),
            other => Err(unexpected_payload("custom", other)),
        }
    }

    pub fn as_code_analysis(&self) -> Result<&CodeAnalysisPayload, AgentError> {
        match self {
            MessagePayload::CodeAnalysis(analysis) => Ok(analysis),
            other => Err(unexpected_payload("code_analysis", other)),
        }
    }

    pub fn as_project_structure(&self) -> Result<&ProjectStructurePayload, AgentError> {
        match self {
            MessagePayload::ProjectStructure(structure) => Ok(structure),
            other => Err(unexpected_payload("project_structure", other)),
        }
    }
}

fn unexpected_payload(expected: &str, actual: &MessagePayload) -> AgentError {
    AgentError::validation_error(format!(
        "expected {expected} payload, got {}",
        actual.kind()
    ))
}

/// Point-to-point call routed by message type
///
/// # Examples
/// ```
/// use a2a_analyzer::protocol::{CustomPayload, MessagePayload, Request};
///
/// let request = Request::new(
///     "cli",
///     "BUG_ANALYSIS_REQUEST",
///     MessagePayload::Custom(CustomPayload::new("analysis_target").with("root", ".")),
/// )
/// .with_timeout_ms(5_000);
///
/// assert_eq!(request.timeout_ms, 5_000);
/// assert!(!request.id.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation key, unique per request
    pub id: String,
    pub sender_id: String,
    pub message_type: String,
    pub payload: MessagePayload,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// How long the caller waits; 0 means the bus default
    pub timeout_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl Request {
    pub fn new(
        sender_id: impl Into<String>,
        message_type: impl Into<String>,
        payload: MessagePayload,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            message_type: message_type.into(),
            payload,
            metadata: BTreeMap::new(),
            timeout_ms: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(self, priority: i32) -> Self {
        self.with_metadata(PRIORITY_METADATA_KEY, priority.to_string())
    }

    /// Per-request priority override, if the caller set a parseable one
    pub fn priority(&self) -> Option<i32> {
        self.metadata
            .get(PRIORITY_METADATA_KEY)
            .and_then(|p| p.trim().parse().ok())
    }
}

/// Answer to exactly one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub sender_id: String,
    /// Must equal the `Request::id` this answers
    pub request_id: String,
    pub success: bool,
    pub payload: MessagePayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Response {
    pub fn success(
        sender_id: impl Into<String>,
        request_id: impl Into<String>,
        payload: MessagePayload,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            request_id: request_id.into(),
            success: true,
            payload,
            error: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Failure response; `error` carries the code, the payload carries the detail
    pub fn failure(
        sender_id: impl Into<String>,
        request_id: impl Into<String>,
        code: ErrorCode,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            request_id: request_id.into(),
            success: false,
            payload: MessagePayload::Error(ErrorPayload {
                error: detail.into(),
            }),
            error: Some(code.as_str().to_string()),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Parsed error code, if this is a failure with a known code
    pub fn error_code(&self) -> Option<ErrorCode> {
        let code = self.error.as_deref()?;
        [
            ErrorCode::UnsupportedType,
            ErrorCode::AgentUnavailable,
            ErrorCode::Timeout,
            ErrorCode::ValidationError,
            ErrorCode::InternalError,
        ]
        .into_iter()
        .find(|c| c.as_str() == code)
    }

    /// Human-readable failure detail carried in an error payload
    pub fn error_detail(&self) -> Option<&str> {
        match &self.payload {
            MessagePayload::Error(ErrorPayload { error }) => Some(error),
            _ => None,
        }
    }
}

/// Fire-and-forget notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub sender_id: String,
    pub event_type: String,
    pub payload: MessagePayload,
    /// Global fan-out when true, topic-scoped delivery otherwise
    pub broadcast: bool,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        sender_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: MessagePayload,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            event_type: event_type.into(),
            payload,
            broadcast: false,
            timestamp: Utc::now(),
        }
    }

    pub fn broadcast(mut self) -> Self {
        self.broadcast = true;
        self
    }
}

/// Tagged union of everything that travels over the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum AgentMessage {
    Request(Request),
    Response(Response),
    Event(Event),
}

impl AgentMessage {
    pub fn sender_id(&self) -> &str {
        match self {
            AgentMessage::Request(r) => &r.sender_id,
            AgentMessage::Response(r) => &r.sender_id,
            AgentMessage::Event(e) => &e.sender_id,
        }
    }

    /// Correlation key: the request id for requests and responses
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            AgentMessage::Request(r) => Some(&r.id),
            AgentMessage::Response(r) => Some(&r.request_id),
            AgentMessage::Event(_) => None,
        }
    }
}

impl From<Request> for AgentMessage {
    fn from(request: Request) -> Self {
        AgentMessage::Request(request)
    }
}

impl From<Response> for AgentMessage {
    fn from(response: Response) -> Self {
        AgentMessage::Response(response)
    }
}

impl From<Event> for AgentMessage {
    fn from(event: Event) -> Self {
        AgentMessage::Event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_ids_are_unique() {
        let a = Request::new("a", "X", MessagePayload::Empty);
        let b = Request::new("a", "X", MessagePayload::Empty);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_request_priority_override() {
        let request = Request::new("a", "X", MessagePayload::Empty).with_priority(-3);
        assert_eq!(request.priority(), Some(-3));

        let garbage = Request::new("a", "X", MessagePayload::Empty).with_metadata("priority", "high");
        assert_eq!(garbage.priority(), None);
    }

    #[test]
    fn test_failure_response_carries_code_and_detail() {
        let response = Response::failure("bus", "r1", ErrorCode::Timeout, "no reply in 50ms");
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("timeout"));
        assert_eq!(response.error_code(), Some(ErrorCode::Timeout));
        assert_eq!(response.error_detail(), Some("no reply in 50ms"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn test_agent_type_parsing() {
        assert_eq!("bug_detection".parse::<AgentType>().unwrap(), AgentType::BugDetection);
        assert_eq!(
            "REPORT_GENERATOR".parse::<AgentType>().unwrap(),
            AgentType::ReportGenerator
        );
        assert!("LINTER".parse::<AgentType>().is_err());
    }

    #[test]
    fn test_unknown_payload_variant_is_validation_error() {
        let err = MessagePayload::from_json(json!({"kind": "telepathy", "data": 1})).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_payload_wire_shape() {
        let payload = MessagePayload::Custom(CustomPayload::new("analysis_target").with("root", "/tmp"));
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["kind"], "custom");
        assert_eq!(value["type"], "analysis_target");
        assert_eq!(value["data"]["root"], "/tmp");

        let parsed = MessagePayload::from_json(value).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_payload_accessors_reject_wrong_shape() {
        let payload = MessagePayload::Error(ErrorPayload {
            error: "boom".to_string(),
        });
        let err = payload.as_code_analysis().unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ValidationError);
        assert!(err.to_string().contains("code_analysis"));
    }

    #[test]
    fn test_custom_payload_required_fields() {
        let custom = CustomPayload::new("analysis_target").with("root", 7);
        assert!(custom.require_str("root").is_err());
        assert!(custom.require("root").is_ok());
        assert!(custom.require("missing").is_err());
    }

    #[test]
    fn test_agent_message_correlation() {
        let request = Request::new("caller", "X", MessagePayload::Empty).with_id("r1");
        let response = Response::success("agent", "r1", MessagePayload::Empty);
        let event = Event::new("agent", "SOMETHING", MessagePayload::Empty);

        assert_eq!(AgentMessage::from(request).correlation_id(), Some("r1"));
        assert_eq!(AgentMessage::from(response).correlation_id(), Some("r1"));
        assert_eq!(AgentMessage::from(event).correlation_id(), None);
    }
}
