//! Error taxonomy for the agent communication core
//!
//! Every failure maps to exactly one protocol error code. Errors never cross
//! the bus boundary as Rust errors: they are converted to failure responses
//! at the point of detection.

use crate::protocol::messages::{ErrorCode, Response};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Longest detail message allowed to leave an agent
const MAX_ERROR_DETAIL_LEN: usize = 500;
const TRUNCATION_SUFFIX: &str = "...[truncated]";

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b((?:\w+_)?(?:password|token|key|secret))[=:]\s*\S+")
        .expect("secret pattern compiles")
});

/// Main error type for bus and agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Unsupported message type: {message_type}")]
    UnsupportedType { message_type: String },

    #[error("No agent available for message type: {message_type}")]
    AgentUnavailable { message_type: String },

    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    Timeout { request_id: String, timeout_ms: u64 },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },

    #[error("Handler panicked: {message}")]
    HandlerPanic { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Protocol error code for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AgentError::UnsupportedType { .. } => ErrorCode::UnsupportedType,
            AgentError::AgentUnavailable { .. } => ErrorCode::AgentUnavailable,
            AgentError::Timeout { .. } => ErrorCode::Timeout,
            AgentError::ValidationError { .. } => ErrorCode::ValidationError,
            AgentError::InternalError { .. }
            | AgentError::HandlerPanic { .. }
            | AgentError::Config(_)
            | AgentError::Io(_)
            | AgentError::Serialization(_) => ErrorCode::InternalError,
        }
    }

    /// Convert into the failure response answering `request_id`
    pub fn to_response(&self, sender_id: &str, request_id: &str) -> Response {
        Response::failure(
            sender_id,
            request_id,
            self.error_code(),
            sanitize_error_message(&self.to_string()),
        )
    }

    pub fn unsupported_type<S: Into<String>>(message_type: S) -> Self {
        Self::UnsupportedType {
            message_type: message_type.into(),
        }
    }

    pub fn agent_unavailable<S: Into<String>>(message_type: S) -> Self {
        Self::AgentUnavailable {
            message_type: message_type.into(),
        }
    }

    pub fn timeout<S: Into<String>>(request_id: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            request_id: request_id.into(),
            timeout_ms,
        }
    }

    pub fn validation_error<S: Into<String>>(message: S) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    pub fn handler_panic<S: Into<String>>(message: S) -> Self {
        Self::HandlerPanic {
            message: message.into(),
        }
    }
}

/// Redact credentials and bound the length of a detail message
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .into_owned();

    if sanitized.len() > MAX_ERROR_DETAIL_LEN {
        let mut cut = MAX_ERROR_DETAIL_LEN - TRUNCATION_SUFFIX.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(TRUNCATION_SUFFIX);
    }

    sanitized
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;
