//! Observability for the agent bus
//!
//! Structured logging setup and per-bus counters.

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{BusMetrics, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{aggregation_span, dispatch_span, request_span};
