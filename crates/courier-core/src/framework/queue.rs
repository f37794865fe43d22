//! Command queue between event sources and the dispatcher.
//!
//! Adapters enqueue canonical messages through a [`QueueHandle`]; the
//! dispatch loop drains the queue on a periodic tick or when an explicit
//! drain signal fires. The queue's sole ordering invariant is FIFO: items
//! are dequeued in arrival order and each item is handed out at most once.
//!
//! The queue is bounded only by memory. Exceeding the configured soft limit
//! logs a warning but never drops or blocks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::foundation::message::Message;

/// A queued item: the canonical message plus the identity of the connection
/// that produced it.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// Identity of the producing connection (adapter name or connection id).
    pub source: String,
    /// The normalized message.
    pub message: Message,
}

/// FIFO buffer decoupling event arrival from dispatch.
pub struct CommandQueue {
    items: Mutex<VecDeque<QueuedMessage>>,
    soft_limit: usize,
    drain: Notify,
}

impl CommandQueue {
    /// Creates a queue with the given soft limit.
    pub fn new(soft_limit: usize) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(VecDeque::new()),
            soft_limit,
            drain: Notify::new(),
        })
    }

    /// Creates a producer handle for the given source.
    ///
    /// Clones of a handle share one closed flag, so closing the connection
    /// that owns the handle stops every producer path for that source while
    /// leaving already-queued items to be dispatched normally.
    pub fn handle(self: &Arc<Self>, source: impl Into<String>) -> QueueHandle {
        QueueHandle {
            queue: Arc::clone(self),
            source: source.into(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn enqueue(&self, entry: QueuedMessage) {
        let depth = {
            let mut items = self.items.lock();
            items.push_back(entry);
            items.len()
        };
        if depth > self.soft_limit {
            warn!(
                depth,
                soft_limit = self.soft_limit,
                "command queue exceeds soft limit"
            );
        }
    }

    /// Removes and returns all currently queued items, in arrival order.
    ///
    /// The returned iterator is one-shot: items arriving after this call are
    /// only seen by a subsequent `dequeue_all`.
    pub fn dequeue_all(&self) -> std::collections::vec_deque::IntoIter<QueuedMessage> {
        std::mem::take(&mut *self.items.lock()).into_iter()
    }

    /// Signals the dispatcher to drain ahead of the periodic tick.
    pub fn drain_now(&self) {
        self.drain.notify_one();
    }

    /// Resolves when a drain signal has been issued.
    pub async fn drain_signalled(&self) {
        self.drain.notified().await;
    }

    /// Number of currently queued items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// Cloneable producer side of a [`CommandQueue`].
#[derive(Clone)]
pub struct QueueHandle {
    queue: Arc<CommandQueue>,
    source: String,
    closed: Arc<AtomicBool>,
}

impl QueueHandle {
    /// Appends a message to the queue tail. Never blocks.
    ///
    /// Returns false if this handle has been closed; the message is not
    /// enqueued in that case.
    pub fn enqueue(&self, message: Message) -> bool {
        if self.closed.load(Ordering::Acquire) {
            debug!(source = %self.source, message_id = %message.id, "enqueue after close, dropping");
            return false;
        }
        self.queue.enqueue(QueuedMessage {
            source: self.source.clone(),
            message,
        });
        true
    }

    /// Signals the dispatcher to drain ahead of the periodic tick.
    pub fn drain_now(&self) {
        self.queue.drain_now();
    }

    /// Stops further enqueues from this source. Already-queued items are
    /// still dispatched.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Returns true if this handle has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The source identity this handle enqueues under.
    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::message::User;

    fn msg(id: &str) -> Message {
        Message::text(id, User::new("U1", "alice"), "C1", "hi")
    }

    #[test]
    fn dequeue_preserves_arrival_order() {
        let queue = CommandQueue::new(16);
        let handle = queue.handle("test");
        for i in 0..5 {
            assert!(handle.enqueue(msg(&i.to_string())));
        }

        let ids: Vec<String> = queue.dequeue_all().map(|e| e.message.id).collect();
        assert_eq!(ids, ["0", "1", "2", "3", "4"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn dequeue_all_is_one_shot() {
        let queue = CommandQueue::new(16);
        let handle = queue.handle("test");
        handle.enqueue(msg("a"));

        let first: Vec<_> = queue.dequeue_all().collect();
        assert_eq!(first.len(), 1);
        assert_eq!(queue.dequeue_all().count(), 0);

        // New arrivals are visible to a fresh drain only.
        handle.enqueue(msg("b"));
        let second: Vec<_> = queue.dequeue_all().collect();
        assert_eq!(second[0].message.id, "b");
    }

    #[test]
    fn soft_limit_never_drops() {
        let queue = CommandQueue::new(2);
        let handle = queue.handle("test");
        for i in 0..10 {
            handle.enqueue(msg(&i.to_string()));
        }
        assert_eq!(queue.len(), 10);
    }

    #[test]
    fn closed_handle_rejects_new_items_but_keeps_queued_ones() {
        let queue = CommandQueue::new(16);
        let handle = queue.handle("test");
        handle.enqueue(msg("kept"));
        handle.close();
        assert!(!handle.enqueue(msg("dropped")));

        let ids: Vec<String> = queue.dequeue_all().map(|e| e.message.id).collect();
        assert_eq!(ids, ["kept"]);
    }

    #[tokio::test]
    async fn drain_signal_wakes_waiter() {
        let queue = CommandQueue::new(16);
        let handle = queue.handle("test");
        handle.drain_now();
        // The permit is stored, so an immediate wait resolves.
        queue.drain_signalled().await;
    }
}
