//! The RTM adapter: streaming connection lifecycle and outbound delivery.
//!
//! One adapter task owns the connection state machine:
//!
//! ```text
//! Disconnected ─▶ Connecting ─▶ Authenticated ─▶ Connected ─┬─▶ Closed
//!      ▲                                                    └─▶ Errored
//!      └────────────── reconnect (when configured) ◀────────────┘
//! ```
//!
//! `Connected` is entered only after the bot identity is resolved and the
//! user directory is loaded. A platform error frame marks the state
//! `Errored` and reports, without dropping the stream; a goodbye frame or a
//! closed stream marks it `Closed` and either reconnects after the
//! configured delay or, when reconnection is off, closes the queue handle
//! and cancels the robot. A refused connect is reported to the error
//! channel and ends the lifecycle; reconnection only covers streams that
//! were established and then dropped.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_core::{Adapter, AdapterError, AdapterResult, Envelope, Robot, wait_loaded};

use crate::client::{BotIdentity, BoxedClient, ClientError, ClientResult, RtmSession, UserInfo};
use crate::config::RtmConfig;
use crate::events::WireEvent;
use crate::normalize::Normalizer;

/// Observable phase of the adapter's connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection attempt yet, or between reconnect attempts.
    Disconnected,
    /// A connect call is in flight.
    Connecting,
    /// The stream is open and the bot identity is known.
    Authenticated,
    /// Fully operational: directory loaded, events flowing.
    Connected,
    /// A non-fatal platform error was reported. The stream stays open.
    Errored,
    /// The stream ended.
    Closed,
}

/// RTM adapter over an abstract [`crate::client::RtmClient`].
pub struct RtmAdapter {
    client: BoxedClient,
    config: RtmConfig,
    normalizer: Normalizer,
    identity: RwLock<Option<BotIdentity>>,
    state_tx: watch::Sender<ConnectionState>,
    stop: CancellationToken,
}

impl RtmAdapter {
    /// Creates an adapter speaking through `client`.
    pub fn new(client: BoxedClient, config: RtmConfig) -> Self {
        let normalizer = Normalizer::new(
            Arc::clone(&client),
            config.cache_ttl(),
            config.fetch_timeout(),
        );
        let (state_tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            client,
            config,
            normalizer,
            identity: RwLock::new(None),
            state_tx,
            stop: CancellationToken::new(),
        }
    }

    /// The adapter configuration.
    pub fn config(&self) -> &RtmConfig {
        &self.config
    }

    /// The bot identity, once resolved.
    pub fn identity(&self) -> Option<BotIdentity> {
        self.identity.read().clone()
    }

    /// Subscribes to connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        if *self.state_tx.borrow() != state {
            debug!(?state, "connection state changed");
            let _ = self.state_tx.send(state);
        }
    }

    /// Fetches every page of the user directory, in page order, and primes
    /// the enrichment cache with the result.
    ///
    /// Pagination terminates on an absent or empty cursor, so exactly one
    /// call sees the terminal page.
    pub async fn load_user_directory(&self) -> ClientResult<Vec<UserInfo>> {
        let mut members = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .client
                .list_users(cursor.as_deref(), self.config.page_limit)
                .await?;
            members.extend(page.members);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        info!(users = members.len(), "user directory loaded");
        self.normalizer.remember_users(members.iter().cloned());
        Ok(members)
    }

    /// Runs the connection lifecycle until a terminal close or
    /// [`Adapter::close`].
    ///
    /// Inbound events are normalized and enqueued on the robot's command
    /// queue; dispatch stays in the robot's own loop.
    pub async fn run(self: Arc<Self>, robot: Arc<Robot>) {
        let handle = robot.queue_handle("rtm");

        loop {
            if self.stop.is_cancelled() {
                break;
            }
            self.set_state(ConnectionState::Connecting);

            let session = tokio::select! {
                _ = self.stop.cancelled() => break,
                result = self.client.connect() => result,
            };
            match session {
                Ok(session) => {
                    self.on_connected(&robot, &handle, session).await;
                }
                Err(e) => {
                    // A refused connect is terminal; the reconnect policy
                    // covers streams that were established and then ended.
                    warn!(error = %e, "connect attempt failed");
                    robot
                        .errors()
                        .report(e, courier_core::ErrorContext::default());
                    break;
                }
            }

            self.set_state(ConnectionState::Closed);
            if !self.config.auto_reconnect || self.stop.is_cancelled() {
                break;
            }
            info!(delay_ms = self.config.reconnect_delay_ms, "reconnecting");
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
            }
            self.set_state(ConnectionState::Disconnected);
        }

        // Terminal: stop producing, let queued items drain, stop the robot.
        self.set_state(ConnectionState::Closed);
        handle.close();
        robot.shutdown();
        info!("adapter stopped");
    }

    async fn on_connected(
        &self,
        robot: &Arc<Robot>,
        handle: &courier_core::QueueHandle,
        mut session: RtmSession,
    ) {
        info!(bot = %session.identity.name, "stream established");
        *self.identity.write() = Some(session.identity.clone());
        self.set_state(ConnectionState::Authenticated);

        if let Err(e) = self.load_user_directory().await {
            warn!(error = %e, "user directory load failed, continuing without it");
        }
        self.set_state(ConnectionState::Connected);

        self.spawn_presence_subscription(robot);

        loop {
            let event = tokio::select! {
                _ = self.stop.cancelled() => return,
                event = session.events.recv() => event,
            };
            let Some(event) = event else {
                debug!("event stream closed");
                return;
            };
            match event {
                WireEvent::Goodbye => {
                    info!("goodbye frame received, stream closing");
                    return;
                }
                WireEvent::Error { code, msg } => {
                    self.set_state(ConnectionState::Errored);
                    robot.errors().report(
                        AdapterError::Platform(format!("{code}: {msg}")),
                        courier_core::ErrorContext::default(),
                    );
                }
                event => {
                    if let Some(message) = self.normalizer.normalize(event).await {
                        // A normalized event after an error frame means the
                        // stream recovered.
                        self.set_state(ConnectionState::Connected);
                        handle.enqueue(message);
                    }
                }
            }
        }
    }

    /// Subscribes to presence updates once persisted state is available.
    ///
    /// The subscription waits for the brain's loaded signal so the user set
    /// reflects restored state, not just the fresh directory.
    fn spawn_presence_subscription(&self, robot: &Arc<Robot>) {
        let client = Arc::clone(&self.client);
        let brain = robot.brain();
        let stop = self.stop.clone();
        let identity = self.identity.read().clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = wait_loaded(brain.as_ref()) => {}
            }
            let ids: Vec<String> = identity.into_iter().map(|i| i.user_id).collect();
            if let Err(e) = client.subscribe_presence(&ids).await {
                warn!(error = %e, "presence subscription failed");
            } else {
                debug!(users = ids.len(), "presence subscription issued");
            }
        });
    }
}

fn to_adapter_error(e: ClientError) -> AdapterError {
    match e {
        ClientError::Timeout => AdapterError::Timeout,
        ClientError::Connect(_) => AdapterError::NotConnected,
        other => AdapterError::Platform(other.to_string()),
    }
}

#[async_trait]
impl Adapter for RtmAdapter {
    fn name(&self) -> &str {
        "rtm"
    }

    async fn send(&self, envelope: &Envelope, payloads: &[String]) -> AdapterResult<()> {
        for payload in payloads {
            self.client
                .post_message(&envelope.room, payload)
                .await
                .map_err(to_adapter_error)?;
        }
        Ok(())
    }

    async fn set_topic(&self, envelope: &Envelope, topic: &str) -> AdapterResult<()> {
        self.client
            .set_topic(&envelope.room, topic)
            .await
            .map_err(to_adapter_error)
    }

    fn is_direct_room(&self, room: &str) -> bool {
        room.starts_with('D')
    }

    async fn close(&self) {
        self.stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ConversationInfo, RtmClient, UserPage};
    use courier_core::{MemoryBrain, MessageType};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Client scripted with a fixed set of sessions and directory pages.
    #[derive(Default)]
    struct ScriptedClient {
        sessions: Mutex<Vec<Vec<WireEvent>>>,
        pages: Vec<UserPage>,
        connects: AtomicUsize,
        list_calls: AtomicUsize,
        presence_calls: AtomicUsize,
        posted: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedClient {
        fn with_session(self, events: Vec<WireEvent>) -> Self {
            self.sessions.lock().push(events);
            self
        }

        fn with_pages(mut self, pages: Vec<UserPage>) -> Self {
            self.pages = pages;
            self
        }
    }

    #[async_trait]
    impl RtmClient for ScriptedClient {
        async fn connect(&self) -> ClientResult<RtmSession> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let events = {
                let mut sessions = self.sessions.lock();
                if sessions.is_empty() {
                    return Err(ClientError::Connect("no more sessions".into()));
                }
                sessions.remove(0)
            };
            let (tx, rx) = mpsc::channel(64);
            for event in events {
                tx.send(event).await.map_err(|_| ClientError::Connect("closed".into()))?;
            }
            // Dropping tx closes the stream after the scripted events.
            Ok(RtmSession {
                identity: BotIdentity {
                    user_id: "UBOT".to_owned(),
                    name: "courier".to_owned(),
                },
                events: rx,
            })
        }

        async fn fetch_user(&self, id: &str) -> ClientResult<UserInfo> {
            Ok(UserInfo {
                id: id.to_owned(),
                name: format!("user-{id}"),
                attributes: HashMap::new(),
            })
        }

        async fn fetch_bot(&self, bot_id: &str) -> ClientResult<UserInfo> {
            Err(ClientError::NotFound(bot_id.to_owned()))
        }

        async fn fetch_conversation(&self, id: &str) -> ClientResult<ConversationInfo> {
            Err(ClientError::NotFound(id.to_owned()))
        }

        async fn list_users(&self, cursor: Option<&str>, _limit: usize) -> ClientResult<UserPage> {
            let index = self.list_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(cursor.is_none(), index == 0);
            Ok(self.pages.get(index).cloned().unwrap_or_default())
        }

        async fn post_message(&self, room: &str, text: &str) -> ClientResult<()> {
            self.posted.lock().push((room.to_owned(), text.to_owned()));
            Ok(())
        }

        async fn set_topic(&self, _room: &str, _topic: &str) -> ClientResult<()> {
            Ok(())
        }

        async fn subscribe_presence(&self, _user_ids: &[String]) -> ClientResult<()> {
            self.presence_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn member(id: &str) -> UserInfo {
        UserInfo {
            id: id.to_owned(),
            name: format!("user-{id}"),
            attributes: HashMap::new(),
        }
    }

    fn message_event(user: &str, channel: &str, text: &str, ts: &str) -> WireEvent {
        WireEvent::Message(crate::events::MessageFrame {
            channel: channel.to_owned(),
            user: Some(user.to_owned()),
            text: Some(text.to_owned()),
            ts: ts.to_owned(),
            ..Default::default()
        })
    }

    fn no_reconnect() -> RtmConfig {
        RtmConfig {
            auto_reconnect: false,
            ..RtmConfig::default()
        }
    }

    #[tokio::test]
    async fn pagination_accumulates_pages_in_order() {
        let client = Arc::new(ScriptedClient::default().with_pages(vec![
            UserPage {
                members: vec![member("U1"), member("U2")],
                next_cursor: Some("c1".to_owned()),
            },
            UserPage {
                members: vec![member("U3")],
                next_cursor: Some(String::new()),
            },
        ]));
        let adapter = RtmAdapter::new(Arc::clone(&client) as BoxedClient, no_reconnect());

        let members = adapter.load_user_directory().await.unwrap();
        let ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["U1", "U2", "U3"]);
        // The empty terminal cursor stops pagination after exactly two calls.
        assert_eq!(client.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clean_close_without_reconnect_stops_the_robot() {
        let client = Arc::new(
            ScriptedClient::default()
                .with_session(vec![
                    message_event("U1", "C1", "hello", "1.001"),
                    WireEvent::Goodbye,
                ]),
        );
        let adapter = Arc::new(RtmAdapter::new(Arc::clone(&client) as BoxedClient, no_reconnect()));
        let robot = Arc::new(Robot::new("courier"));
        robot.set_brain(Arc::new(MemoryBrain::loaded()));

        let mut states = adapter.subscribe_state();
        Arc::clone(&adapter).run(Arc::clone(&robot)).await;

        assert_eq!(client.connects.load(Ordering::SeqCst), 1);
        assert!(robot.cancellation_token().is_cancelled());
        assert_eq!(*states.borrow_and_update(), ConnectionState::Closed);

        // The message received before the goodbye still dispatches.
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        robot
            .hear("hello", move |_res| {
                let f = Arc::clone(&f);
                Box::pin(async move {
                    f.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .unwrap();
        robot.drain().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_end_reconnects_when_configured() {
        let client = Arc::new(
            ScriptedClient::default()
                .with_session(vec![WireEvent::Goodbye])
                .with_session(vec![WireEvent::Goodbye]),
        );
        let config = RtmConfig {
            auto_reconnect: true,
            reconnect_delay_ms: 100,
            ..RtmConfig::default()
        };
        let adapter = Arc::new(RtmAdapter::new(Arc::clone(&client) as BoxedClient, config));
        let robot = Arc::new(Robot::new("courier"));
        robot.set_brain(Arc::new(MemoryBrain::loaded()));
        let mut error_rx = robot.errors().subscribe();

        // Third connect fails, ending the run loop.
        Arc::clone(&adapter).run(Arc::clone(&robot)).await;
        assert_eq!(client.connects.load(Ordering::SeqCst), 3);

        // Giving up is not silent.
        let reported = error_rx.recv().await.unwrap();
        assert!(reported.error.contains("connection failed"));
    }

    #[tokio::test]
    async fn failed_connect_reports_and_stops_the_robot() {
        let client = Arc::new(ScriptedClient::default());
        let adapter = Arc::new(RtmAdapter::new(Arc::clone(&client) as BoxedClient, no_reconnect()));
        let robot = Arc::new(Robot::new("courier"));
        robot.set_brain(Arc::new(MemoryBrain::loaded()));
        let mut error_rx = robot.errors().subscribe();

        Arc::clone(&adapter).run(Arc::clone(&robot)).await;

        let reported = error_rx.recv().await.unwrap();
        assert!(reported.error.contains("connection failed"));
        assert!(robot.cancellation_token().is_cancelled());
        assert_eq!(adapter.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn presence_subscription_waits_for_brain_load() {
        let client = Arc::new(
            ScriptedClient::default().with_session(vec![message_event("U1", "C1", "hi", "1.001")]),
        );
        let adapter = Arc::new(RtmAdapter::new(Arc::clone(&client) as BoxedClient, no_reconnect()));
        let robot = Arc::new(Robot::new("courier"));
        let brain = Arc::new(MemoryBrain::new());
        robot.set_brain(Arc::clone(&brain) as courier_core::BoxedBrain);

        Arc::clone(&adapter).run(Arc::clone(&robot)).await;
        tokio::task::yield_now().await;
        assert_eq!(client.presence_calls.load(Ordering::SeqCst), 0);

        brain.mark_loaded();
        tokio::time::timeout(Duration::from_secs(1), async {
            while client.presence_calls.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("presence subscription not issued");
    }

    #[tokio::test]
    async fn error_frame_reports_without_dropping_the_stream() {
        let client = Arc::new(ScriptedClient::default().with_session(vec![
            WireEvent::Error {
                code: 429,
                msg: "rate limited".to_owned(),
            },
            message_event("U1", "C1", "still here", "1.002"),
        ]));
        let adapter = Arc::new(RtmAdapter::new(Arc::clone(&client) as BoxedClient, no_reconnect()));
        let robot = Arc::new(Robot::new("courier"));
        robot.set_brain(Arc::new(MemoryBrain::loaded()));
        let mut error_rx = robot.errors().subscribe();

        Arc::clone(&adapter).run(Arc::clone(&robot)).await;

        let reported = error_rx.recv().await.unwrap();
        assert!(reported.error.contains("platform operation failed: 429: rate limited"));
        // The message after the error frame still reached the queue.
        assert_eq!(robot.queue().len(), 1);
    }

    #[tokio::test]
    async fn send_posts_each_payload_and_close_stops_the_loop() {
        let client = Arc::new(ScriptedClient::default());
        let adapter = RtmAdapter::new(Arc::clone(&client) as BoxedClient, no_reconnect());

        let envelope = Envelope {
            room: "C1".to_owned(),
            user: courier_core::User::new("U1", "alice"),
            message_id: "1".to_owned(),
        };
        adapter
            .send(&envelope, &["one".to_owned(), "two".to_owned()])
            .await
            .unwrap();
        assert_eq!(
            client.posted.lock().as_slice(),
            &[
                ("C1".to_owned(), "one".to_owned()),
                ("C1".to_owned(), "two".to_owned())
            ]
        );

        assert!(adapter.is_direct_room("D1"));
        assert!(!adapter.is_direct_room("C1"));

        adapter.close().await;
        assert!(adapter.stop.is_cancelled());
    }

    #[tokio::test]
    async fn normalized_events_reach_the_queue_with_kinds() {
        let client = Arc::new(ScriptedClient::default().with_session(vec![
            message_event("U1", "C1", "hello", "1.001"),
            WireEvent::MemberJoinedChannel {
                channel: "C1".to_owned(),
                user: "U2".to_owned(),
                ts: "1.002".to_owned(),
            },
        ]));
        let adapter = Arc::new(RtmAdapter::new(Arc::clone(&client) as BoxedClient, no_reconnect()));
        let robot = Arc::new(Robot::new("courier"));
        robot.set_brain(Arc::new(MemoryBrain::loaded()));

        Arc::clone(&adapter).run(Arc::clone(&robot)).await;

        let queued: Vec<_> = robot.queue().dequeue_all().collect();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].message.message_type(), MessageType::Text);
        assert_eq!(queued[0].message.user.name, "user-U1");
        assert_eq!(queued[1].message.message_type(), MessageType::Enter);
    }
}
