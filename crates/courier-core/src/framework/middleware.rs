//! Three-phase middleware pipeline.
//!
//! Courier runs three independently ordered chains around dispatch:
//!
//! - **receive** middleware runs once per inbound message, before matching.
//!   A halt skips listener matching entirely for that message.
//! - **listener** middleware runs once per matched listener, before the
//!   callback. A halt skips only that listener's callback.
//! - **response** middleware runs once per outbound send/reply/topic. A halt
//!   suppresses that specific transmission.
//!
//! Stages run strictly sequentially within a chain. Each stage takes the
//! context by value and passes it on, so any mutation is visible to later
//! stages and to the final callback or transmission. A stage error is
//! treated as an implicit halt of its chain and is reported, never raised
//! further.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::foundation::message::{Envelope, Message};
use crate::framework::listener::{ListenerInfo, MatchResult};

/// Continuation verdict returned by a middleware stage.
///
/// `Continue` hands the (possibly mutated) context to the next stage; `Halt`
/// stops the chain without error, skipping the guarded operation.
pub enum Flow<C> {
    /// Proceed with this context.
    Continue(C),
    /// Stop the chain; the guarded operation does not run. Not an error.
    Halt,
}

/// Error returned by a failing middleware stage.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct MiddlewareError(pub String);

impl MiddlewareError {
    /// Creates a middleware error from any displayable value.
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

/// Result of a single middleware stage.
pub type MiddlewareResult<C> = Result<Flow<C>, MiddlewareError>;

/// A middleware stage over a context type `C`.
#[async_trait]
pub trait Middleware<C: Send + 'static>: Send + Sync {
    /// Runs the stage. The returned context flows to the next stage.
    async fn call(&self, ctx: C) -> MiddlewareResult<C>;
}

/// Adaptor turning an async closure into a [`Middleware`] stage.
pub struct FnMiddleware<F>(F);

#[async_trait]
impl<C, F, Fut> Middleware<C> for FnMiddleware<F>
where
    C: Send + 'static,
    F: Fn(C) -> Fut + Send + Sync,
    Fut: Future<Output = MiddlewareResult<C>> + Send,
{
    async fn call(&self, ctx: C) -> MiddlewareResult<C> {
        (self.0)(ctx).await
    }
}

/// Wraps an async closure as a boxed middleware stage.
///
/// ```rust,ignore
/// use courier_core::framework::middleware::{middleware_fn, Flow};
///
/// let stage = middleware_fn(|mut ctx: ReceiveContext| async move {
///     ctx.message.text = ctx.message.text.take().map(|t| t.to_lowercase());
///     Ok(Flow::Continue(ctx))
/// });
/// ```
pub fn middleware_fn<C, F, Fut>(f: F) -> Arc<dyn Middleware<C>>
where
    C: Send + 'static,
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult<C>> + Send + 'static,
{
    Arc::new(FnMiddleware(f))
}

// ============================================================================
// Chain
// ============================================================================

/// An ordered chain of middleware stages.
pub struct MiddlewareChain<C> {
    /// Chain name used in logs and error reports.
    chain: &'static str,
    stages: Vec<Arc<dyn Middleware<C>>>,
}

// Stages are shared; cloning a chain is cheap and does not require C: Clone.
impl<C> Clone for MiddlewareChain<C> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain,
            stages: self.stages.clone(),
        }
    }
}

impl<C: Send + 'static> MiddlewareChain<C> {
    /// Creates an empty chain with the given name.
    pub fn new(chain: &'static str) -> Self {
        Self {
            chain,
            stages: Vec::new(),
        }
    }

    /// Appends a stage. Stages run in registration order.
    pub fn register(&mut self, stage: Arc<dyn Middleware<C>>) {
        self.stages.push(stage);
    }

    /// The chain name.
    pub fn name(&self) -> &'static str {
        self.chain
    }

    /// Number of registered stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if no stages are registered.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage in order until one halts or fails.
    ///
    /// Each stage is awaited to completion before the next runs. Returns the
    /// threaded context on completion, `Halt` if a stage halted, or the
    /// failing stage's error (which callers treat as a halt of the chain).
    pub async fn run(&self, mut ctx: C) -> MiddlewareResult<C> {
        for (index, stage) in self.stages.iter().enumerate() {
            match stage.call(ctx).await? {
                Flow::Continue(next) => ctx = next,
                Flow::Halt => {
                    debug!(chain = self.chain, stage = index, "middleware halted chain");
                    return Ok(Flow::Halt);
                }
            }
        }
        Ok(Flow::Continue(ctx))
    }
}

// ============================================================================
// Contexts
// ============================================================================

/// Context for the receive chain: the inbound message, pre-match.
pub struct ReceiveContext {
    /// The message about to be matched. Edits are what gets matched.
    pub message: Message,
}

/// Context for the listener chain: one matched listener, pre-callback.
pub struct ListenerContext {
    /// The matched message.
    pub message: Message,
    /// Identity and options of the matched listener.
    pub listener: ListenerInfo,
    /// Captures produced by the listener's matcher.
    pub captures: MatchResult,
}

/// Which response operation a [`ResponseContext`] guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMethod {
    /// Plain room send.
    Send,
    /// Reply addressed to the envelope user.
    Reply,
    /// Topic change.
    Topic,
}

/// Context for the response chain: one outbound transmission.
pub struct ResponseContext {
    /// Where the transmission is addressed.
    pub envelope: Envelope,
    /// Which operation produced it.
    pub method: SendMethod,
    /// Payload strings, mutable up to the moment of transmission.
    pub payloads: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::message::User;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx() -> ReceiveContext {
        ReceiveContext {
            message: Message::text("1", User::new("U1", "alice"), "C1", "Hello"),
        }
    }

    #[tokio::test]
    async fn stages_run_in_order_and_see_mutations() {
        let mut chain = MiddlewareChain::new("receive");
        chain.register(middleware_fn(|mut c: ReceiveContext| async move {
            c.message.text = c.message.text.take().map(|t| t.to_lowercase());
            Ok(Flow::Continue(c))
        }));
        chain.register(middleware_fn(|mut c: ReceiveContext| async move {
            // Sees the first stage's edit.
            assert_eq!(c.message.text_or_empty(), "hello");
            c.message.text = Some(format!("{}!", c.message.text_or_empty()));
            Ok(Flow::Continue(c))
        }));

        match chain.run(ctx()).await.unwrap() {
            Flow::Continue(out) => assert_eq!(out.message.text_or_empty(), "hello!"),
            Flow::Halt => panic!("unexpected halt"),
        }
    }

    #[tokio::test]
    async fn halt_skips_later_stages() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);

        let mut chain = MiddlewareChain::new("receive");
        chain.register(middleware_fn(|_c: ReceiveContext| async move {
            Ok(Flow::Halt)
        }));
        chain.register(middleware_fn(move |c: ReceiveContext| {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::Continue(c))
            }
        }));

        assert!(matches!(chain.run(ctx()).await.unwrap(), Flow::Halt));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stage_error_stops_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);

        let mut chain = MiddlewareChain::new("receive");
        chain.register(middleware_fn(|_c: ReceiveContext| async move {
            Err(MiddlewareError::new("boom"))
        }));
        chain.register(middleware_fn(move |c: ReceiveContext| {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::Continue(c))
            }
        }));

        assert!(chain.run(ctx()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_chain_continues() {
        let chain: MiddlewareChain<ReceiveContext> = MiddlewareChain::new("receive");
        assert!(matches!(
            chain.run(ctx()).await.unwrap(),
            Flow::Continue(_)
        ));
    }
}
