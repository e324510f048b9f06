//! Agent runtime contract
//!
//! [`A2AAgent`] is what every agent implements; [`AgentRuntime`] is the
//! wrapper the bus dispatches through. The wrapper is identical for every
//! agent kind:
//!
//! 1. reject message types the agent does not declare, without taking a slot
//! 2. wait for one of `max_concurrent_messages` slots, priority then FIFO
//! 3. report `STARTED`
//! 4. invoke the handler, capturing errors and panics
//! 5. report `COMPLETED` or `FAILED`, release the slot, return the response

use crate::agent::scheduler::PriorityGate;
use crate::config::AgentOverrides;
use crate::dispatch_span;
use crate::error::AgentError;
use crate::observability::BusMetrics;
use crate::progress::{ExecutionReporter, NoOpReporter};
use crate::protocol::{AgentType, Event, Request, Response};
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Instrument};

pub const DEFAULT_MESSAGE_PRIORITY: i32 = 100;
pub const DEFAULT_MAX_CONCURRENT_MESSAGES: usize = 4;

/// Per-request context handed to a handler
///
/// The token is cancelled when the caller stops waiting. Handlers may check
/// it; nothing forces them to stop.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self { cancellation }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the caller has given up on this request
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// An independently implemented unit that handles declared request types
#[async_trait]
pub trait A2AAgent: Send + Sync {
    fn a2a_agent_id(&self) -> &str;

    fn agent_type(&self) -> AgentType;

    /// Request types this agent accepts
    fn supported_message_types(&self) -> Vec<String>;

    /// Event types this agent may emit
    fn published_event_types(&self) -> Vec<String> {
        Vec::new()
    }

    /// Event types delivered to [`A2AAgent::handle_event`]
    fn subscribed_event_types(&self) -> Vec<String> {
        Vec::new()
    }

    /// Lower values are serviced first when requests queue
    fn message_processing_priority(&self) -> i32 {
        DEFAULT_MESSAGE_PRIORITY
    }

    fn max_concurrent_messages(&self) -> usize {
        DEFAULT_MAX_CONCURRENT_MESSAGES
    }

    /// Handle one request
    ///
    /// `Ok(None)` means "not applicable" and becomes an `unsupported_type`
    /// failure. Errors become failure responses carrying their error code.
    async fn handle_request(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> Result<Option<Response>, AgentError>;

    async fn handle_event(&self, _event: &Event) -> Result<(), AgentError> {
        Ok(())
    }
}

/// Capabilities of a registered agent, after configuration overrides
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentDescriptor {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub supported_message_types: Vec<String>,
    pub published_event_types: Vec<String>,
    pub subscribed_event_types: Vec<String>,
    pub priority: i32,
    pub max_concurrent_messages: usize,
}

impl AgentDescriptor {
    pub fn from_agent(agent: &dyn A2AAgent, overrides: &AgentOverrides) -> Self {
        Self {
            agent_id: agent.a2a_agent_id().to_string(),
            agent_type: agent.agent_type(),
            supported_message_types: agent.supported_message_types(),
            published_event_types: agent.published_event_types(),
            subscribed_event_types: agent.subscribed_event_types(),
            priority: overrides
                .priority
                .unwrap_or_else(|| agent.message_processing_priority()),
            max_concurrent_messages: overrides
                .max_concurrent_messages
                .unwrap_or_else(|| agent.max_concurrent_messages())
                .max(1),
        }
    }

    pub fn supports(&self, message_type: &str) -> bool {
        self.supported_message_types
            .iter()
            .any(|t| t == message_type)
    }
}

/// Dispatch wrapper around one agent
pub struct AgentRuntime {
    agent: Arc<dyn A2AAgent>,
    descriptor: AgentDescriptor,
    gate: PriorityGate,
    reporter: Arc<dyn ExecutionReporter>,
    metrics: Arc<BusMetrics>,
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("descriptor", &self.descriptor)
            .field("gate", &self.gate)
            .finish()
    }
}

impl AgentRuntime {
    pub fn new(
        agent: Arc<dyn A2AAgent>,
        overrides: &AgentOverrides,
        reporter: Arc<dyn ExecutionReporter>,
        metrics: Arc<BusMetrics>,
    ) -> Self {
        let descriptor = AgentDescriptor::from_agent(agent.as_ref(), overrides);
        let gate = PriorityGate::new(descriptor.max_concurrent_messages);
        Self {
            agent,
            descriptor,
            gate,
            reporter,
            metrics,
        }
    }

    /// A runtime that reports nowhere and keeps its own metrics
    pub fn standalone(agent: Arc<dyn A2AAgent>, overrides: &AgentOverrides) -> Self {
        Self::new(
            agent,
            overrides,
            Arc::new(NoOpReporter),
            Arc::new(BusMetrics::new()),
        )
    }

    pub fn agent_id(&self) -> &str {
        &self.descriptor.agent_id
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    pub fn supports(&self, message_type: &str) -> bool {
        self.descriptor.supports(message_type)
    }

    /// Handlers currently executing
    pub fn in_flight(&self) -> usize {
        self.gate.in_flight()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.gate.peak_in_flight()
    }

    /// Requests waiting for a slot
    pub fn queued(&self) -> usize {
        self.gate.queued()
    }

    /// Run one request through the dispatch wrapper
    ///
    /// Always yields a response whose `request_id` matches the request.
    pub async fn dispatch(&self, request: Request, ctx: RequestContext) -> Response {
        let span = dispatch_span!(
            agent_id = %self.descriptor.agent_id,
            request_id = %request.id,
            message_type = %request.message_type
        );
        self.dispatch_inner(request, ctx).instrument(span).await
    }

    async fn dispatch_inner(&self, request: Request, ctx: RequestContext) -> Response {
        let agent_id = self.descriptor.agent_id.as_str();

        if !self.supports(&request.message_type) {
            warn!(
                "Agent {} rejected unsupported message type {}",
                agent_id, request.message_type
            );
            self.metrics.unsupported_rejected();
            return AgentError::unsupported_type(&request.message_type)
                .to_response(agent_id, &request.id);
        }

        let priority = request.priority().unwrap_or(self.descriptor.priority);
        let _permit = tokio::select! {
            permit = self.gate.acquire(priority) => permit,
            _ = ctx.cancelled() => {
                debug!("Caller gave up before a slot was free");
                return AgentError::timeout(&request.id, request.timeout_ms)
                    .to_response(agent_id, &request.id);
            }
        };

        self.reporter.report_started(agent_id, &request.id).await;

        let outcome = AssertUnwindSafe(self.agent.handle_request(&request, &ctx))
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(Ok(Some(mut response))) => {
                if response.request_id != request.id {
                    debug!(
                        "Rewriting response request_id {} to {}",
                        response.request_id, request.id
                    );
                    response.request_id = request.id.clone();
                }
                response
            }
            Ok(Ok(None)) => {
                self.metrics.unsupported_rejected();
                AgentError::unsupported_type(&request.message_type)
                    .to_response(agent_id, &request.id)
            }
            Ok(Err(e)) => {
                warn!("Handler failed: {}", e);
                self.metrics.handler_failed();
                e.to_response(agent_id, &request.id)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Handler panicked: {}", message);
                self.metrics.handler_panicked();
                AgentError::handler_panic(message).to_response(agent_id, &request.id)
            }
        };

        if response.success {
            self.reporter
                .report_completed(agent_id, &request.id, Some(response.payload.kind()))
                .await;
        } else {
            let error = response
                .error_detail()
                .or(response.error.as_deref())
                .unwrap_or("unknown error");
            self.reporter
                .report_failed(agent_id, &request.id, error)
                .await;
        }

        response
    }

    /// Deliver an event to the agent, capturing panics
    pub async fn deliver_event(&self, event: &Event) -> Result<(), AgentError> {
        match AssertUnwindSafe(self.agent.handle_event(event))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(AgentError::handler_panic(panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
