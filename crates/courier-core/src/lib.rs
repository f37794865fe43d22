//! # Courier Core
//!
//! The dispatch engine of the Courier chat-automation framework.
//!
//! This crate provides the message model, listener registry, middleware
//! pipeline, and the central robot that routes every inbound platform event
//! to user scripts.
//!
//! ## Architecture Layers
//!
//! Courier Core is organized into three architectural layers:
//!
//! ### Foundation Layer
//!
//! Canonical data model and error taxonomy:
//! - **Message Model**: One message shape for every platform ([`Message`], [`MessageKind`])
//! - **Addressing**: Users and delivery envelopes ([`User`], [`Envelope`])
//! - **Errors**: Dispatch, adapter, and brain failures ([`DispatchError`], [`AdapterError`])
//!
//! ### Framework Layer
//!
//! Dispatch and routing:
//! - **Command Queue**: FIFO buffering between adapter and robot ([`CommandQueue`], [`QueueHandle`])
//! - **Listeners**: Pattern and kind matching with isolated callbacks ([`Listener`], [`Registry`])
//! - **Middleware**: Receive, listener, and response chains ([`Middleware`], [`MiddlewareChain`])
//! - **Robot**: The dispatch loop tying it all together ([`Robot`])
//!
//! ### Integration Layer
//!
//! External system interfaces:
//! - **Adapter Contract**: Platform send/reply/topic surface ([`Adapter`])
//! - **Brain**: Persisted key-value state with a loaded signal ([`Brain`])
//! - **Error Channel**: Process-wide broadcast of dispatch failures ([`ErrorChannel`])
//!
//! ## Dispatch Flow
//!
//! All messages flow through the central [`Robot`]:
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌────────────┐
//! │   Adapter   │────▶│ CommandQueue │────▶│   Robot    │──▶ listeners
//! │  (RTM, …)   │     │   (FIFO)     │     │ (dispatch) │──▶ catch-all
//! └─────────────┘     └──────────────┘     └────────────┘
//!        ▲                                       │
//!        └────────────── Response.send ◀─────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use courier_core::{Message, Robot, User};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let robot = Arc::new(Robot::new("courier").with_alias("/"));
//!
//!     robot
//!         .respond("ping", |res| {
//!             Box::pin(async move {
//!                 res.reply(&["pong"]).await?;
//!                 Ok(())
//!             })
//!         })
//!         .unwrap();
//!
//!     let handle = robot.queue_handle("demo");
//!     handle.enqueue(Message::text("1", User::new("U1", "alice"), "C1", "courier: ping"));
//!
//!     robot.run().await;
//! }
//! ```

// Architectural layers
pub mod foundation;
pub mod framework;
pub mod integration;

// Re-export foundation types
pub use foundation::{
    AdapterError, AdapterResult, BrainError, BrainResult, DispatchError, DispatchResult, Envelope,
    Message, MessageKind, MessageType, PresenceState, ReactionChange, User,
};

// Re-export framework types
pub use framework::{
    Callback, CallbackError, CallbackResult, CommandQueue, Flow, Listener, ListenerContext,
    ListenerInfo, MatchResult, Middleware, MiddlewareChain, MiddlewareError, MiddlewareResult,
    QueueHandle, QueuedMessage, ReceiveContext, Registry, Response, ResponseContext, Robot,
    SendMethod, middleware_fn,
};

// Re-export integration types
pub use integration::{
    Adapter, BoxedAdapter, BoxedBrain, Brain, ErrorChannel, ErrorContext, ErrorEvent, MemoryBrain,
    wait_loaded,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::*;
    pub use super::framework::{
        Flow, Listener, MatchResult, Middleware, MiddlewareChain, Response, Robot, middleware_fn,
    };
    pub use super::integration::{Adapter, Brain, ErrorChannel};
}
