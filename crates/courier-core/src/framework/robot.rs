//! The robot: Courier's central dispatcher.
//!
//! A [`Robot`] owns the command queue, the listener registry, and the three
//! middleware chains, and runs the single cooperative dispatch loop. The
//! loop drains the queue on a fixed-period tick (or immediately on a
//! drain-now signal) and processes items strictly in arrival order; no two
//! drains run concurrently.
//!
//! For each message: receive middleware runs first (a halt skips everything
//! else, silently); listeners are then evaluated in registration order and
//! *all* matches fire, each behind its own listener-middleware pass and with
//! its own failure isolation; if nothing matched, the message is wrapped and
//! offered to the catch-all chain.
//!
//! ```text
//! adapter ──enqueue──▶ CommandQueue ──drain──▶ Robot
//!                                              ├─ receive middleware
//!                                              ├─ listener match ×N
//!                                              │   ├─ listener middleware
//!                                              │   └─ callback ──▶ Response.send
//!                                              │                    └─ response middleware ──▶ adapter
//!                                              └─ catch-all chain (no match)
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, debug, info, span};

use crate::foundation::error::DispatchError;
use crate::foundation::message::{Message, MessageType};
use crate::framework::listener::{
    CallbackResult, Listener, MatchResult, Registry, panic_detail,
};
use crate::framework::middleware::{
    Flow, ListenerContext, Middleware, MiddlewareChain, ReceiveContext, ResponseContext,
};
use crate::framework::queue::{CommandQueue, QueueHandle};
use crate::framework::response::Response;
use crate::integration::adapter::BoxedAdapter;
use crate::integration::brain::{BoxedBrain, MemoryBrain};
use crate::integration::errors::{ErrorChannel, ErrorContext};

/// Default drain period of the dispatch loop.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(1000);

/// Default queue soft limit before depth warnings are logged.
pub const DEFAULT_QUEUE_SOFT_LIMIT: usize = 1024;

/// The central dispatcher of a Courier instance.
///
/// All queue, registry, and cache state is owned per instance; nothing is
/// process-global. Construct at startup, share via `Arc`, tear down through
/// [`shutdown`](Robot::shutdown).
pub struct Robot {
    name: String,
    alias: Option<String>,
    drain_interval: Duration,
    registry: Registry,
    receive_chain: RwLock<Arc<MiddlewareChain<ReceiveContext>>>,
    listener_chain: RwLock<Arc<MiddlewareChain<ListenerContext>>>,
    response_chain: RwLock<Arc<MiddlewareChain<ResponseContext>>>,
    queue: Arc<CommandQueue>,
    adapter: RwLock<Option<BoxedAdapter>>,
    brain: RwLock<BoxedBrain>,
    errors: ErrorChannel,
    shutdown: CancellationToken,
    /// Serializes drains: the run loop and any external `drain` caller.
    drain_lock: tokio::sync::Mutex<()>,
}

impl Robot {
    /// Creates a robot with default queue and drain settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            registry: Registry::new(),
            receive_chain: RwLock::new(Arc::new(MiddlewareChain::new("receive"))),
            listener_chain: RwLock::new(Arc::new(MiddlewareChain::new("listener"))),
            response_chain: RwLock::new(Arc::new(MiddlewareChain::new("response"))),
            queue: CommandQueue::new(DEFAULT_QUEUE_SOFT_LIMIT),
            adapter: RwLock::new(None),
            brain: RwLock::new(Arc::new(MemoryBrain::loaded())),
            errors: ErrorChannel::default(),
            shutdown: CancellationToken::new(),
            drain_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Sets the alias accepted by `respond` listeners alongside the name.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Sets the drain period of the dispatch loop.
    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    /// Sets the queue soft limit. Only meaningful before handles are taken.
    pub fn with_queue_soft_limit(mut self, limit: usize) -> Self {
        self.queue = CommandQueue::new(limit);
        self
    }

    /// The robot's configured name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The robot's alias, if configured.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The command queue shared with adapters.
    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    /// Creates a producer handle for an event source.
    pub fn queue_handle(&self, source: impl Into<String>) -> QueueHandle {
        self.queue.handle(source)
    }

    /// Attaches the adapter responses are delivered through.
    pub fn attach_adapter(&self, adapter: BoxedAdapter) {
        info!(adapter = adapter.name(), "adapter attached");
        *self.adapter.write() = Some(adapter);
    }

    /// The currently attached adapter, if any.
    pub fn adapter(&self) -> Option<BoxedAdapter> {
        self.adapter.read().clone()
    }

    /// Replaces the brain.
    pub fn set_brain(&self, brain: BoxedBrain) {
        *self.brain.write() = brain;
    }

    /// The brain consulted for enrichment and script state.
    pub fn brain(&self) -> BoxedBrain {
        self.brain.read().clone()
    }

    /// The process-wide error channel.
    pub fn errors(&self) -> &ErrorChannel {
        &self.errors
    }

    /// Token cancelled when the robot shuts down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops the dispatch loop after a final drain of queued items.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // =========================================================================
    // Script registration surface
    // =========================================================================

    /// Registers a listener matching text messages against `pattern`.
    pub fn hear<F>(&self, pattern: &str, callback: F) -> Result<(), regex::Error>
    where
        F: Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync + 'static,
    {
        self.registry.register(Listener::hear(pattern, callback)?);
        Ok(())
    }

    /// Registers a listener matching text addressed to the robot.
    pub fn respond<F>(&self, pattern: &str, callback: F) -> Result<(), regex::Error>
    where
        F: Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync + 'static,
    {
        self.registry.register(Listener::respond(
            &self.name,
            self.alias.as_deref(),
            pattern,
            callback,
        )?);
        Ok(())
    }

    /// Registers a listener fired when a user enters a room.
    pub fn enter<F>(&self, callback: F)
    where
        F: Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync + 'static,
    {
        self.registry.register(Listener::on_kind(MessageType::Enter, callback));
    }

    /// Registers a listener fired when a user leaves a room.
    pub fn leave<F>(&self, callback: F)
    where
        F: Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync + 'static,
    {
        self.registry.register(Listener::on_kind(MessageType::Leave, callback));
    }

    /// Registers a listener fired when a room topic changes.
    pub fn topic<F>(&self, callback: F)
    where
        F: Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync + 'static,
    {
        self.registry.register(Listener::on_kind(MessageType::Topic, callback));
    }

    /// Registers a listener fired for reaction changes.
    pub fn react<F>(&self, callback: F)
    where
        F: Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync + 'static,
    {
        self.registry
            .register(Listener::on_kind(MessageType::Reaction, callback));
    }

    /// Registers a listener fired for shared files.
    pub fn file_shared<F>(&self, callback: F)
    where
        F: Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync + 'static,
    {
        self.registry
            .register(Listener::on_kind(MessageType::FileShared, callback));
    }

    /// Registers a listener fired for presence changes.
    pub fn presence<F>(&self, callback: F)
    where
        F: Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync + 'static,
    {
        self.registry
            .register(Listener::on_kind(MessageType::Presence, callback));
    }

    /// Registers a catch-all listener, fired only for unmatched messages.
    pub fn catch_all<F>(&self, callback: F)
    where
        F: Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync + 'static,
    {
        self.registry.register(Listener::catch_all(callback));
    }

    /// Registers a pre-built listener (the `listen` primitive).
    pub fn listen(&self, listener: Listener) {
        self.registry.register(listener);
    }

    /// Appends a receive middleware stage.
    pub fn receive_middleware(&self, stage: Arc<dyn Middleware<ReceiveContext>>) {
        register_stage(&self.receive_chain, stage);
    }

    /// Appends a listener middleware stage.
    pub fn listener_middleware(&self, stage: Arc<dyn Middleware<ListenerContext>>) {
        register_stage(&self.listener_chain, stage);
    }

    /// Appends a response middleware stage.
    pub fn response_middleware(&self, stage: Arc<dyn Middleware<ResponseContext>>) {
        register_stage(&self.response_chain, stage);
    }

    // =========================================================================
    // Dispatch loop
    // =========================================================================

    /// Runs the dispatch loop until [`shutdown`](Robot::shutdown).
    ///
    /// The loop drains on the configured period or immediately on a
    /// drain-now signal. A final drain runs on shutdown so items already
    /// queued are still dispatched.
    pub async fn run(&self) {
        info!(name = %self.name, interval_ms = self.drain_interval.as_millis() as u64, "dispatch loop started");
        let mut tick = tokio::time::interval(self.drain_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tick.tick() => {}
                _ = self.queue.drain_signalled() => {}
            }
            self.drain().await;
        }

        self.drain().await;
        info!(name = %self.name, "dispatch loop stopped");
    }

    /// Drains all currently queued messages, in arrival order.
    ///
    /// Serialized: a drain started while another is in flight waits for it.
    pub async fn drain(&self) {
        let _serialized = self.drain_lock.lock().await;
        for entry in self.queue.dequeue_all() {
            self.receive(entry.message).await;
        }
    }

    /// Dispatches one message through the full pipeline, bypassing the queue.
    pub async fn receive(&self, message: Message) {
        let s = span!(Level::DEBUG, "dispatch", message_id = %message.id, room = %message.room);
        self.process(message).instrument(s).await;
    }

    async fn process(&self, message: Message) {
        let context = ErrorContext::for_message(&message.id, &message.room);

        // Receive middleware: a halt (or a failing stage, treated as one)
        // skips matching entirely for this message.
        let chain = self.receive_chain.read().clone();
        let message = match chain.run(ReceiveContext { message }).await {
            Ok(Flow::Continue(ctx)) => ctx.message,
            Ok(Flow::Halt) => {
                debug!("receive middleware halted message");
                return;
            }
            Err(e) => {
                self.errors.report(
                    DispatchError::Middleware {
                        chain: "receive",
                        detail: e.to_string(),
                    },
                    context,
                );
                return;
            }
        };

        let mut matched_any = false;
        for listener in self.registry.snapshot() {
            match listener.try_match(&message) {
                Ok(None) => {}
                Ok(Some(result)) => {
                    matched_any = true;
                    self.invoke(&listener, &message, result).await;
                }
                Err(detail) => {
                    self.errors.report(
                        DispatchError::Match {
                            listener: listener.info().name.clone(),
                            detail,
                        },
                        context.clone().with_listener(&listener.info().name),
                    );
                }
            }
        }

        if !matched_any && message.message_type() != MessageType::CatchAll {
            let wrapped = message.into_catch_all();
            for listener in self.registry.catch_all_snapshot() {
                match listener.try_match(&wrapped) {
                    Ok(Some(result)) => self.invoke(&listener, &wrapped, result).await,
                    Ok(None) => {}
                    Err(detail) => {
                        self.errors.report(
                            DispatchError::Match {
                                listener: listener.info().name.clone(),
                                detail,
                            },
                            context.clone().with_listener(&listener.info().name),
                        );
                    }
                }
            }
        }
    }

    /// Runs one matched listener: listener middleware, then the callback.
    ///
    /// The callback is isolated: an `Err` or a panic is reported to the
    /// error channel and does not affect sibling listeners or the loop.
    async fn invoke(&self, listener: &Listener, message: &Message, captures: MatchResult) {
        let name = listener.info().name.clone();
        let context = ErrorContext::for_message(&message.id, &message.room).with_listener(&name);

        let chain = self.listener_chain.read().clone();
        let lctx = ListenerContext {
            message: message.clone(),
            listener: listener.info().clone(),
            captures,
        };
        let lctx = match chain.run(lctx).await {
            Ok(Flow::Continue(lctx)) => lctx,
            Ok(Flow::Halt) => {
                debug!(listener = %name, "listener middleware halted callback");
                return;
            }
            Err(e) => {
                self.errors.report(
                    DispatchError::Middleware {
                        chain: "listener",
                        detail: e.to_string(),
                    },
                    context,
                );
                return;
            }
        };

        let response = Response::new(
            lctx.message,
            lctx.captures,
            self.adapter.read().clone(),
            self.response_chain.read().clone(),
            self.errors.clone(),
        );

        let callback = listener.callback();
        match std::panic::AssertUnwindSafe(callback(response))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.errors.report(
                    DispatchError::Callback {
                        listener: name,
                        detail: e.to_string(),
                    },
                    context,
                );
            }
            Err(payload) => {
                self.errors.report(
                    DispatchError::Callback {
                        listener: name,
                        detail: panic_detail(payload),
                    },
                    context,
                );
            }
        }
    }
}

fn register_stage<C: Send + 'static>(
    slot: &RwLock<Arc<MiddlewareChain<C>>>,
    stage: Arc<dyn Middleware<C>>,
) {
    let mut guard = slot.write();
    let mut chain = (**guard).clone();
    chain.register(stage);
    *guard = Arc::new(chain);
}
