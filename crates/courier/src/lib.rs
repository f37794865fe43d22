//! # Courier
//!
//! A middleware-driven chat-automation framework for Rust.
//!
//! ## Overview
//!
//! Courier routes every inbound chat event through one canonical pipeline:
//! adapters normalize platform frames into a shared message model, a FIFO
//! command queue buffers them, and a central robot matches them against
//! registered listeners behind three middleware chains.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌──────────────┐     ┌───────────────────────────────┐
//! │  Adapter  │────▶│ CommandQueue │────▶│ Robot                         │
//! │  (RTM)    │     │   (FIFO)     │     │  receive middleware           │
//! └───────────┘     └──────────────┘     │  listeners (ordered, isolated)│
//!       ▲                                │  response middleware          │
//!       └──────────── send/reply ◀───────┴───────────────────────────────┘
//! ```
//!
//! - **Runtime**: configuration, logging, signal-driven lifecycle
//! - **Adapters**: platform normalization behind the `Adapter` contract
//! - **Robot**: the dispatch loop, listener registry, middleware chains
//! - **Brain**: key-value state behind an async boundary
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> courier::runtime::RuntimeResult<()> {
//!     let runtime = CourierRuntime::new();
//!
//!     let robot = runtime.robot();
//!     robot
//!         .respond("ping", |res| {
//!             Box::pin(async move {
//!                 res.reply(&["pong"]).await?;
//!                 Ok(())
//!             })
//!         })
//!         .unwrap();
//!
//!     runtime.attach_client(my_rtm_client);
//!     runtime.run().await
//! }
//! ```

pub use courier_adapter_rtm as rtm;
pub use courier_core as core;
pub use courier_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use courier_runtime::{CourierConfig, CourierRuntime};

    // Dispatch surface
    pub use courier_core::{
        Adapter, Brain, Envelope, Flow, Listener, Message, MessageKind, MessageType, Response,
        Robot, User, middleware_fn,
    };

    // RTM adapter
    pub use courier_adapter_rtm::{RtmAdapter, RtmClient, RtmConfig};
}
