//! Message model for the agent communication core
//!
//! Every component (bus, registry, runtime, aggregator, agents) speaks the
//! envelope defined here.

pub mod message_types;
pub mod messages;

pub use message_types::*;
pub use messages::*;
