//! Testing utilities and mock implementations
//!
//! Mock agents and reporters for exercising the bus, the runtime wrapper and
//! the aggregator without touching the filesystem.

pub mod mocks;

pub use mocks::*;
