//! Unified error types for the Courier core.
//!
//! Each error names the granularity at which it is contained: per-message
//! and per-listener failures never escape the dispatch loop, adapter-side
//! failures never escape a single event or connection attempt.

use thiserror::Error;

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Errors raised while dispatching a single message.
///
/// All of these are contained at per-message or per-listener granularity:
/// they are logged, reported to the error channel, and dispatch continues.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// A listener's matcher panicked while evaluating a message.
    #[error("matcher for listener '{listener}' panicked: {detail}")]
    Match {
        /// The listener whose matcher failed.
        listener: String,
        /// Panic payload, when recoverable as a string.
        detail: String,
    },

    /// A listener callback returned an error or panicked.
    #[error("callback for listener '{listener}' failed: {detail}")]
    Callback {
        /// The listener whose callback failed.
        listener: String,
        /// Failure description.
        detail: String,
    },

    /// A middleware stage returned an error; treated as a halt of its chain.
    #[error("{chain} middleware failed: {detail}")]
    Middleware {
        /// Which chain the stage belonged to (receive, listener, response).
        chain: &'static str,
        /// Failure description.
        detail: String,
    },

    /// A send was addressed to an envelope with no room attribution.
    #[error("message '{message_id}' has no room attribution, cannot deliver")]
    NoRoom {
        /// Id of the message the response was built from.
        message_id: String,
    },

    /// No adapter is attached to the robot.
    #[error("no adapter attached")]
    NoAdapter,

    /// The adapter failed to transmit. Sends are not retried.
    #[error("send failed: {0}")]
    Send(String),
}

/// Errors raised by an adapter operation invoked from the core.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// The platform rejected or failed the operation.
    #[error("platform operation failed: {0}")]
    Platform(String),

    /// The adapter is not connected.
    #[error("adapter not connected")]
    NotConnected,

    /// The operation timed out.
    #[error("adapter operation timed out")]
    Timeout,
}

/// Errors raised by the brain boundary.
#[derive(Debug, Clone, Error)]
pub enum BrainError {
    /// Persisting the brain state failed.
    #[error("failed to save brain state: {0}")]
    Save(String),

    /// Closing the backing store failed.
    #[error("failed to close brain: {0}")]
    Close(String),
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Result type for brain operations.
pub type BrainResult<T> = Result<T, BrainError>;
