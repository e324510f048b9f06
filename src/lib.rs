//! A2A Analyzer - agent communication core
//!
//! An in-process message bus for a multi-agent code-analysis assistant.
//!
//! # Overview
//!
//! - Typed message model: requests, responses, events and their payloads
//! - Agent registry with deterministic routing by message type
//! - Message bus with request/response correlation, timeouts and event fan-out
//! - Runtime wrapper enforcing per-agent concurrency, priority queuing and
//!   lifecycle reporting
//! - Aggregator that fans out to several agents, tolerates partial failure and
//!   correlates findings by location
//!
//! # Quick Start
//!
//! ```rust
//! use a2a_analyzer::agent::{A2AAgent, RequestContext};
//! use a2a_analyzer::bus::MessageBus;
//! use a2a_analyzer::error::AgentError;
//! use a2a_analyzer::protocol::{AgentType, MessagePayload, Request, Response};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl A2AAgent for Echo {
//!     fn a2a_agent_id(&self) -> &str {
//!         "echo"
//!     }
//!
//!     fn agent_type(&self) -> AgentType {
//!         AgentType::CodeReview
//!     }
//!
//!     fn supported_message_types(&self) -> Vec<String> {
//!         vec!["ECHO".to_string()]
//!     }
//!
//!     async fn handle_request(
//!         &self,
//!         request: &Request,
//!         _ctx: &RequestContext,
//!     ) -> Result<Option<Response>, AgentError> {
//!         Ok(Some(Response::success("echo", &request.id, request.payload.clone())))
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let bus = MessageBus::default();
//! bus.register_agent(Arc::new(Echo));
//!
//! let response = bus
//!     .request_response(Request::new("me", "ECHO", MessagePayload::Empty).with_timeout_ms(1_000))
//!     .await;
//! assert!(response.success);
//! # });
//! ```

pub mod agent;
pub mod agents;
pub mod aggregation;
pub mod bus;
pub mod config;
pub mod error;
pub mod observability;
pub mod progress;
pub mod protocol;
pub mod render;
pub mod testing;

pub use agent::{A2AAgent, AgentRegistry, AgentRuntime, RequestContext};
pub use aggregation::{Aggregator, ComprehensiveReport};
pub use bus::{MessageBus, SubscriptionId, WeakMessageBus};
pub use config::{AppConfig, ConfigError};
pub use error::{AgentError, AgentResult};
pub use protocol::*;
