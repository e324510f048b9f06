//! Agent runtime layer
//!
//! The trait every agent implements, the dispatch wrapper the bus calls
//! through, the per-agent priority scheduler, and the registry that owns the
//! runtimes.

pub mod registry;
pub mod runtime;
pub mod scheduler;

pub use registry::AgentRegistry;
pub use runtime::{
    A2AAgent, AgentDescriptor, AgentRuntime, RequestContext, DEFAULT_MAX_CONCURRENT_MESSAGES,
    DEFAULT_MESSAGE_PRIORITY,
};
pub use scheduler::{PriorityGate, SlotPermit};
