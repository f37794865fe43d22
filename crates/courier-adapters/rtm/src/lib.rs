//! # Courier RTM Adapter
//!
//! Streaming adapter connecting Courier to RTM-style chat platforms: a
//! persistent event stream delivers JSON frames, and a request surface
//! answers lookups and posts messages.
//!
//! ## Overview
//!
//! The adapter handles:
//!
//! - Wire-frame parsing into a tagged [`WireEvent`] model
//! - Normalization and enrichment into canonical Courier messages,
//!   with TTL-cached user and conversation lookups
//! - Cursor-paginated user directory loading
//! - The connection lifecycle: state machine, reconnect policy, and
//!   deferred presence subscription
//!
//! The concrete wire protocol lives behind the [`RtmClient`] trait, so the
//! adapter logic is testable with scripted clients and reusable across
//! transports.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use courier_adapter_rtm::{RtmAdapter, RtmConfig};
//! use courier_core::Robot;
//!
//! let robot = Arc::new(Robot::new("courier"));
//! let adapter = Arc::new(RtmAdapter::new(client, RtmConfig::default()));
//! robot.attach_adapter(Arc::clone(&adapter) as _);
//!
//! tokio::spawn(Arc::clone(&adapter).run(Arc::clone(&robot)));
//! robot.run().await;
//! ```

pub mod adapter;
pub mod cache;
pub mod client;
pub mod config;
pub mod events;
pub mod normalize;

pub use adapter::{ConnectionState, RtmAdapter};
pub use cache::TtlCache;
pub use client::{
    BotIdentity, BoxedClient, ClientError, ClientResult, ConversationInfo, RtmClient, RtmSession,
    UserInfo, UserPage,
};
pub use config::RtmConfig;
pub use events::{MessageFrame, ReactionFrame, ReactionItem, WireEvent};
pub use normalize::Normalizer;
