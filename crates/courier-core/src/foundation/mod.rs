//! Foundation layer - canonical data model and error taxonomy.
//!
//! This module contains the fundamental building blocks of the Courier core:
//! - The canonical message model shared by all adapters
//! - Users, envelopes, and message-kind discriminants
//! - Error types for dispatch, adapter, and brain operations

pub mod error;
pub mod message;

pub use error::{
    AdapterError, AdapterResult, BrainError, BrainResult, DispatchError, DispatchResult,
};
pub use message::{Envelope, Message, MessageKind, MessageType, PresenceState, ReactionChange, User};
