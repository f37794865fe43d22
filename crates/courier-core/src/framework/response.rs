//! Per-match response objects.
//!
//! A [`Response`] is constructed for every dispatched match and discarded
//! when the callback completes. It carries the matched message, the capture
//! groups, and the envelope, and exposes the outbound operations that
//! delegate to the adapter after running the response middleware chain.

use std::sync::Arc;

use tracing::debug;

use crate::foundation::error::{DispatchError, DispatchResult};
use crate::foundation::message::{Envelope, Message};
use crate::framework::listener::MatchResult;
use crate::framework::middleware::{Flow, MiddlewareChain, ResponseContext, SendMethod};
use crate::integration::adapter::BoxedAdapter;
use crate::integration::errors::{ErrorChannel, ErrorContext};

/// Ephemeral handle for responding to one matched message.
pub struct Response {
    message: Message,
    captures: MatchResult,
    envelope: Envelope,
    adapter: Option<BoxedAdapter>,
    response_chain: Arc<MiddlewareChain<ResponseContext>>,
    errors: ErrorChannel,
}

impl Response {
    pub(crate) fn new(
        message: Message,
        captures: MatchResult,
        adapter: Option<BoxedAdapter>,
        response_chain: Arc<MiddlewareChain<ResponseContext>>,
        errors: ErrorChannel,
    ) -> Self {
        let envelope = message.envelope();
        Self {
            message,
            captures,
            envelope,
            adapter,
            response_chain,
            errors,
        }
    }

    /// The matched message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// All capture groups from the match.
    pub fn captures(&self) -> &MatchResult {
        &self.captures
    }

    /// Capture group `index`, if it participated in the match.
    pub fn matched(&self, index: usize) -> Option<&str> {
        self.captures.get(index)
    }

    /// Where a response will be addressed.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Sends payloads to the message's room.
    pub async fn send(&self, payloads: &[&str]) -> DispatchResult<()> {
        self.transmit(SendMethod::Send, to_owned_payloads(payloads))
            .await
    }

    /// Replies to the message's user. The adapter prefixes an `@`-mention
    /// unless the room is a direct-message room.
    pub async fn reply(&self, payloads: &[&str]) -> DispatchResult<()> {
        self.transmit(SendMethod::Reply, to_owned_payloads(payloads))
            .await
    }

    /// Sets the room topic.
    pub async fn set_topic(&self, topic: &str) -> DispatchResult<()> {
        self.transmit(SendMethod::Topic, vec![topic.to_owned()])
            .await
    }

    /// Runs the response chain, then hands the transmission to the adapter.
    ///
    /// A chain halt (or stage error, treated as one) suppresses this
    /// transmission only and is not surfaced to the caller. Transport
    /// failures are logged and reported, never retried.
    async fn transmit(&self, method: SendMethod, payloads: Vec<String>) -> DispatchResult<()> {
        let context = ErrorContext::for_message(&self.message.id, &self.message.room);

        if self.envelope.is_undeliverable() {
            let err = DispatchError::NoRoom {
                message_id: self.message.id.clone(),
            };
            self.errors.report(&err, context);
            return Err(err);
        }

        let Some(adapter) = self.adapter.as_ref() else {
            let err = DispatchError::NoAdapter;
            self.errors.report(&err, context);
            return Err(err);
        };

        let ctx = ResponseContext {
            envelope: self.envelope.clone(),
            method,
            payloads,
        };
        let ctx = match self.response_chain.run(ctx).await {
            Ok(Flow::Continue(ctx)) => ctx,
            Ok(Flow::Halt) => {
                debug!(message_id = %self.message.id, ?method, "transmission suppressed by response middleware");
                return Ok(());
            }
            Err(e) => {
                self.errors.report(
                    DispatchError::Middleware {
                        chain: "response",
                        detail: e.to_string(),
                    },
                    context,
                );
                return Ok(());
            }
        };

        let result = match ctx.method {
            SendMethod::Send => adapter.send(&ctx.envelope, &ctx.payloads).await,
            SendMethod::Reply => adapter.reply(&ctx.envelope, &ctx.payloads).await,
            SendMethod::Topic => {
                let topic = ctx.payloads.first().map(String::as_str).unwrap_or("");
                adapter.set_topic(&ctx.envelope, topic).await
            }
        };

        result.map_err(|e| {
            let err = DispatchError::Send(e.to_string());
            self.errors.report(&err, context);
            err
        })
    }
}

fn to_owned_payloads(payloads: &[&str]) -> Vec<String> {
    payloads.iter().map(|p| (*p).to_owned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::error::AdapterResult;
    use crate::foundation::message::{MessageKind, User};
    use crate::framework::middleware::middleware_fn;
    use crate::integration::adapter::Adapter;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingAdapter {
        sent: Mutex<Vec<(String, Vec<String>)>>,
        topics: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Adapter for RecordingAdapter {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, envelope: &Envelope, payloads: &[String]) -> AdapterResult<()> {
            self.sent
                .lock()
                .push((envelope.room.clone(), payloads.to_vec()));
            Ok(())
        }

        async fn set_topic(&self, envelope: &Envelope, topic: &str) -> AdapterResult<()> {
            self.topics
                .lock()
                .push((envelope.room.clone(), topic.to_owned()));
            Ok(())
        }

        fn is_direct_room(&self, room: &str) -> bool {
            room.starts_with('D')
        }

        async fn close(&self) {}
    }

    fn response_for(room: &str, adapter: Arc<RecordingAdapter>) -> Response {
        response_with_chain(room, adapter, MiddlewareChain::new("response"))
    }

    fn response_with_chain(
        room: &str,
        adapter: Arc<RecordingAdapter>,
        chain: MiddlewareChain<ResponseContext>,
    ) -> Response {
        let message = Message::text("1", User::new("U1", "alice"), room, "hello");
        Response::new(
            message,
            MatchResult::default(),
            Some(adapter),
            Arc::new(chain),
            ErrorChannel::new(8),
        )
    }

    #[tokio::test]
    async fn send_delivers_to_room() {
        let adapter = Arc::new(RecordingAdapter::default());
        let res = response_for("C1", Arc::clone(&adapter));

        res.send(&["hi there"]).await.unwrap();

        let sent = adapter.sent.lock();
        assert_eq!(sent.as_slice(), &[("C1".into(), vec!["hi there".into()])]);
    }

    #[tokio::test]
    async fn reply_prefixes_mention_in_channels_only() {
        let adapter = Arc::new(RecordingAdapter::default());
        let res = response_for("C1", Arc::clone(&adapter));
        res.reply(&["on it"]).await.unwrap();

        let dm = response_for("D1", Arc::clone(&adapter));
        dm.reply(&["on it"]).await.unwrap();

        let sent = adapter.sent.lock();
        assert_eq!(sent[0].1, vec!["@alice on it".to_string()]);
        assert_eq!(sent[1].1, vec!["on it".to_string()]);
    }

    #[tokio::test]
    async fn set_topic_reaches_adapter() {
        let adapter = Arc::new(RecordingAdapter::default());
        let res = response_for("C1", Arc::clone(&adapter));
        res.set_topic("standup at ten").await.unwrap();
        assert_eq!(
            adapter.topics.lock().as_slice(),
            &[("C1".into(), "standup at ten".into())]
        );
    }

    #[tokio::test]
    async fn response_middleware_can_rewrite_and_suppress() {
        let adapter = Arc::new(RecordingAdapter::default());

        let mut chain = MiddlewareChain::new("response");
        chain.register(middleware_fn(|mut ctx: ResponseContext| async move {
            if ctx.payloads.iter().any(|p| p.contains("secret")) {
                return Ok(Flow::Halt);
            }
            for p in &mut ctx.payloads {
                p.push('!');
            }
            Ok(Flow::Continue(ctx))
        }));
        let res = response_with_chain("C1", Arc::clone(&adapter), chain);

        res.send(&["the secret plan"]).await.unwrap();
        res.send(&["hello"]).await.unwrap();

        let sent = adapter.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, vec!["hello!".to_string()]);
    }

    #[tokio::test]
    async fn empty_room_is_rejected_and_reported() {
        let adapter = Arc::new(RecordingAdapter::default());
        let errors = ErrorChannel::new(8);
        let mut error_rx = errors.subscribe();

        let message = Message::with_kind(
            "9",
            User::partial("U2"),
            "",
            MessageKind::FileShared {
                file_id: "F1".into(),
            },
        );
        let res = Response::new(
            message,
            MatchResult::default(),
            Some(Arc::clone(&adapter) as BoxedAdapter),
            Arc::new(MiddlewareChain::new("response")),
            errors,
        );

        assert!(matches!(
            res.send(&["nowhere"]).await,
            Err(DispatchError::NoRoom { .. })
        ));
        assert!(adapter.sent.lock().is_empty());
        assert_eq!(error_rx.recv().await.unwrap().context.message_id.as_deref(), Some("9"));
    }
}
