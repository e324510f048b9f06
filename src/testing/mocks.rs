//! Mock implementations for testing
//!
//! `MockAgent` is configurable by delay and behavior and records how it was
//! driven: calls, concurrent executions, observed cancellations and events.

use crate::agent::runtime::{A2AAgent, RequestContext, DEFAULT_MESSAGE_PRIORITY};
use crate::error::AgentError;
use crate::progress::ExecutionReporter;
use crate::protocol::{
    AgentType, CodeAnalysisPayload, ErrorCode, Event, ExecutionStatus, Finding, MessagePayload,
    Request, Response,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// What a mock does once its delay has elapsed
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Succeed with an empty payload
    Reply,
    /// Succeed with the given payload
    ReplyWith(MessagePayload),
    /// Return an error mapping to the given code
    Fail(ErrorCode),
    Panic,
    /// Return `Ok(None)`
    NotApplicable,
}

impl MockBehavior {
    /// Succeed with a code-analysis payload holding `findings`
    pub fn findings(findings: Vec<Finding>) -> Self {
        MockBehavior::ReplyWith(MessagePayload::CodeAnalysis(CodeAnalysisPayload {
            summary: format!("{} findings", findings.len()),
            findings,
        }))
    }
}

fn error_for(code: ErrorCode) -> AgentError {
    match code {
        ErrorCode::UnsupportedType => AgentError::unsupported_type("mock"),
        ErrorCode::AgentUnavailable => AgentError::agent_unavailable("mock"),
        ErrorCode::Timeout => AgentError::timeout("mock", 0),
        ErrorCode::ValidationError => AgentError::validation_error("mock validation failure"),
        ErrorCode::InternalError => AgentError::internal_error("mock internal failure"),
    }
}

/// Instrumented agent for tests
#[derive(Debug)]
pub struct MockAgent {
    agent_id: String,
    agent_type: AgentType,
    supported: Vec<String>,
    subscribed: Vec<String>,
    priority: i32,
    max_concurrent: usize,
    delay: Duration,
    behavior: Mutex<MockBehavior>,
    event_behavior: MockBehavior,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    cancellations_observed: AtomicUsize,
    events_received: AtomicUsize,
    handled: Mutex<Vec<String>>,
}

impl MockAgent {
    pub fn new(agent_id: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type,
            supported: Vec::new(),
            subscribed: Vec::new(),
            priority: DEFAULT_MESSAGE_PRIORITY,
            max_concurrent: 4,
            delay: Duration::ZERO,
            behavior: Mutex::new(MockBehavior::Reply),
            event_behavior: MockBehavior::Reply,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            cancellations_observed: AtomicUsize::new(0),
            events_received: AtomicUsize::new(0),
            handled: Mutex::new(Vec::new()),
        }
    }

    pub fn handling(mut self, message_type: impl Into<String>) -> Self {
        self.supported.push(message_type.into());
        self
    }

    pub fn subscribing<I, S>(mut self, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscribed
            .extend(event_types.into_iter().map(Into::into));
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_behavior(self, behavior: MockBehavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    /// Behavior for `handle_event`; only `Fail` and `Panic` change anything
    pub fn with_event_behavior(mut self, behavior: MockBehavior) -> Self {
        self.event_behavior = behavior;
        self
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Calls that finished after their caller had given up
    pub fn cancellations_observed(&self) -> usize {
        self.cancellations_observed.load(Ordering::SeqCst)
    }

    pub fn events_received(&self) -> usize {
        self.events_received.load(Ordering::SeqCst)
    }

    /// Request ids in the order their handlers started
    pub fn handled_requests(&self) -> Vec<String> {
        self.handled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Decrements the in-flight counter even if the handler panics
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl A2AAgent for MockAgent {
    fn a2a_agent_id(&self) -> &str {
        &self.agent_id
    }

    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    fn supported_message_types(&self) -> Vec<String> {
        self.supported.clone()
    }

    fn subscribed_event_types(&self) -> Vec<String> {
        self.subscribed.clone()
    }

    fn message_processing_priority(&self) -> i32 {
        self.priority
    }

    fn max_concurrent_messages(&self) -> usize {
        self.max_concurrent
    }

    async fn handle_request(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> Result<Option<Response>, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.handled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.id.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if ctx.is_cancelled() {
            self.cancellations_observed.fetch_add(1, Ordering::SeqCst);
        }

        let behavior = self
            .behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match behavior {
            MockBehavior::Reply => Ok(Some(Response::success(
                &self.agent_id,
                &request.id,
                MessagePayload::Empty,
            ))),
            MockBehavior::ReplyWith(payload) => {
                Ok(Some(Response::success(&self.agent_id, &request.id, payload)))
            }
            MockBehavior::Fail(code) => Err(error_for(code)),
            MockBehavior::Panic => panic!("mock handler panic"),
            MockBehavior::NotApplicable => Ok(None),
        }
    }

    async fn handle_event(&self, _event: &Event) -> Result<(), AgentError> {
        match &self.event_behavior {
            MockBehavior::Panic => panic!("mock event handler panic"),
            MockBehavior::Fail(code) => Err(error_for(*code)),
            _ => {
                self.events_received.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}

/// Reporter that records every lifecycle transition
#[derive(Debug, Default)]
pub struct RecordingReporter {
    records: Mutex<Vec<(String, ExecutionStatus)>>,
}

impl RecordingReporter {
    fn record(&self, request_id: &str, status: ExecutionStatus) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((request_id.to_string(), status));
    }

    pub fn statuses(&self) -> Vec<ExecutionStatus> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn statuses_for(&self, request_id: &str) -> Vec<ExecutionStatus> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, _)| id == request_id)
            .map(|(_, status)| *status)
            .collect()
    }
}

#[async_trait]
impl ExecutionReporter for RecordingReporter {
    async fn report_started(&self, _agent_id: &str, request_id: &str) {
        self.record(request_id, ExecutionStatus::Started);
    }

    async fn report_completed(&self, _agent_id: &str, request_id: &str, _result: Option<&str>) {
        self.record(request_id, ExecutionStatus::Completed);
    }

    async fn report_failed(&self, _agent_id: &str, request_id: &str, _error: &str) {
        self.record(request_id, ExecutionStatus::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Severity;

    #[tokio::test]
    async fn test_mock_counts_calls() {
        let agent = MockAgent::new("m", AgentType::BugDetection).handling("X");
        let request = Request::new("t", "X", MessagePayload::Empty);

        let response = agent
            .handle_request(&request, &RequestContext::default())
            .await
            .unwrap()
            .unwrap();

        assert!(response.success);
        assert_eq!(agent.call_count(), 1);
        assert_eq!(agent.in_flight(), 0);
        assert_eq!(agent.peak_in_flight(), 1);
        assert_eq!(agent.handled_requests(), vec![request.id]);
    }

    #[tokio::test]
    async fn test_mock_findings_behavior() {
        let agent = MockAgent::new("m", AgentType::BugDetection)
            .handling("X")
            .with_behavior(MockBehavior::findings(vec![Finding::new(
                "a.rs",
                1,
                Severity::High,
                "bug",
                "boom",
            )]));
        let request = Request::new("t", "X", MessagePayload::Empty);

        let response = agent
            .handle_request(&request, &RequestContext::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.payload.as_code_analysis().unwrap().findings.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_fail_maps_code() {
        let agent = MockAgent::new("m", AgentType::BugDetection)
            .with_behavior(MockBehavior::Fail(ErrorCode::ValidationError));
        let request = Request::new("t", "X", MessagePayload::Empty);

        let error = agent
            .handle_request(&request, &RequestContext::default())
            .await
            .unwrap_err();
        assert_eq!(error.error_code(), ErrorCode::ValidationError);
    }
}
