//! Adapter trait: the seam between the dispatch core and a platform
//! connection.
//!
//! An adapter owns a live platform connection, normalizes its events into
//! canonical messages (enqueued through a
//! [`QueueHandle`](crate::framework::queue::QueueHandle)), and exposes the
//! outbound operations the dispatcher needs. Concrete wire-protocol clients
//! live outside the core; the core only depends on this trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::foundation::error::AdapterResult;
use crate::foundation::message::Envelope;

/// Outbound operations an adapter provides to the dispatcher.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// The adapter name, used in logs and as the queue source identity.
    fn name(&self) -> &str;

    /// Sends payloads to the envelope's room.
    async fn send(&self, envelope: &Envelope, payloads: &[String]) -> AdapterResult<()>;

    /// Replies to the envelope's user.
    ///
    /// The default implementation prefixes an `@`-mention of the envelope
    /// user unless the room is a direct-message room, then delegates to
    /// [`send`](Adapter::send).
    async fn reply(&self, envelope: &Envelope, payloads: &[String]) -> AdapterResult<()> {
        if self.is_direct_room(&envelope.room) {
            return self.send(envelope, payloads).await;
        }
        let prefixed: Vec<String> = payloads
            .iter()
            .map(|p| format!("@{} {p}", envelope.user.name))
            .collect();
        self.send(envelope, &prefixed).await
    }

    /// Sets the topic of the envelope's room.
    async fn set_topic(&self, envelope: &Envelope, topic: &str) -> AdapterResult<()>;

    /// Returns true if the room is a direct-message room, in which case
    /// replies are not mention-prefixed.
    fn is_direct_room(&self, _room: &str) -> bool {
        false
    }

    /// Closes the platform connection. Messages already queued by this
    /// adapter are still dispatched.
    async fn close(&self);
}

/// A shared adapter trait object.
pub type BoxedAdapter = Arc<dyn Adapter>;
