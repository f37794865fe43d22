//! Process-wide error channel.
//!
//! Per-listener and per-middleware failures are contained at their own
//! granularity; this channel is how they surface. Every report is logged
//! with enough context to reproduce (message id, listener identity, room)
//! and broadcast to any subscribed observers. No error is swallowed without
//! at least one log emission.

use tokio::sync::broadcast;
use tracing::error;

/// Context attached to an error report.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Id of the message being processed, if any.
    pub message_id: Option<String>,
    /// Name of the listener involved, if any.
    pub listener: Option<String>,
    /// Room the message was attributed to, if any.
    pub room: Option<String>,
}

impl ErrorContext {
    /// Context for a failure tied to a message.
    pub fn for_message(message_id: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            message_id: Some(message_id.into()),
            listener: None,
            room: Some(room.into()),
        }
    }

    /// Adds the listener identity.
    pub fn with_listener(mut self, listener: impl Into<String>) -> Self {
        self.listener = Some(listener.into());
        self
    }
}

/// A single reported error with its context.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// Rendered error.
    pub error: String,
    /// Where the error occurred.
    pub context: ErrorContext,
}

/// Broadcast channel carrying [`ErrorEvent`]s to observers.
///
/// Cloning shares the underlying channel. Reports are delivered to every
/// live subscriber; with no subscribers the log emission is the only sink.
#[derive(Clone)]
pub struct ErrorChannel {
    tx: broadcast::Sender<ErrorEvent>,
}

impl ErrorChannel {
    /// Creates a channel retaining up to `capacity` undelivered events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes to future error events.
    pub fn subscribe(&self) -> broadcast::Receiver<ErrorEvent> {
        self.tx.subscribe()
    }

    /// Logs and broadcasts an error.
    pub fn report(&self, err: impl std::fmt::Display, context: ErrorContext) {
        let rendered = err.to_string();
        error!(
            error = %rendered,
            message_id = context.message_id.as_deref().unwrap_or("-"),
            listener = context.listener.as_deref().unwrap_or("-"),
            room = context.room.as_deref().unwrap_or("-"),
            "dispatch error"
        );
        let _ = self.tx.send(ErrorEvent {
            error: rendered,
            context,
        });
    }
}

impl Default for ErrorChannel {
    fn default() -> Self {
        Self::new(64)
    }
}
