//! Integration layer - external system interfaces.
//!
//! - Adapter contract for platform connections
//! - Brain boundary for persisted key-value state
//! - Process-wide error channel

pub mod adapter;
pub mod brain;
pub mod errors;

pub use adapter::{Adapter, BoxedAdapter};
pub use brain::{BoxedBrain, Brain, MemoryBrain, wait_loaded};
pub use errors::{ErrorChannel, ErrorContext, ErrorEvent};
