//! Framework layer - Dispatch and routing.
//!
//! This module contains the message processing pipeline:
//! - Command queue buffering inbound messages between drains
//! - Listener registry with pattern and kind matching
//! - Three-phase middleware chains (receive, listener, response)
//! - Response objects handed to listener callbacks
//! - The robot, which ties the pipeline together in one dispatch loop

pub mod listener;
pub mod middleware;
pub mod queue;
pub mod response;
pub mod robot;

pub use listener::{
    Callback, CallbackError, CallbackResult, Listener, ListenerInfo, MatchResult, Registry,
};
pub use middleware::{
    Flow, ListenerContext, Middleware, MiddlewareChain, MiddlewareError, MiddlewareResult,
    ReceiveContext, ResponseContext, SendMethod, middleware_fn,
};
pub use queue::{CommandQueue, QueueHandle, QueuedMessage};
pub use response::Response;
pub use robot::{DEFAULT_DRAIN_INTERVAL, DEFAULT_QUEUE_SOFT_LIMIT, Robot};
