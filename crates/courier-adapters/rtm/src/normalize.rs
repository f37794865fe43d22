//! Wire-event normalization and enrichment.
//!
//! The normalizer turns one [`WireEvent`] into at most one canonical
//! [`Message`]. Author ids are enriched into full users through the client,
//! behind a TTL cache and an explicit per-fetch timeout; a failed or expired
//! lookup degrades to a partial user rather than dropping the event. A frame
//! the normalizer cannot attribute at all is logged and dropped, and never
//! affects the rest of the stream.
//!
//! Room attribution:
//!
//! | frame                  | room                                    |
//! |------------------------|-----------------------------------------|
//! | message                | the channel it was posted to            |
//! | member joined/left     | the channel                             |
//! | topic change           | the channel                             |
//! | reaction               | the item's channel if it is a message, else `""` |
//! | file shared            | the sharing channel if reported, else `""` |
//! | presence change        | `""` (presence carries no single room)  |

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use courier_core::{Message, MessageKind, PresenceState, ReactionChange, User};

use crate::cache::TtlCache;
use crate::client::{BoxedClient, ConversationInfo, UserInfo};
use crate::events::{MessageFrame, ReactionFrame, WireEvent};

/// Converts wire events into canonical messages.
pub struct Normalizer {
    client: BoxedClient,
    users: TtlCache<String, UserInfo>,
    conversations: TtlCache<String, ConversationInfo>,
    /// Bot integration ids resolve once and never change.
    bots: Mutex<HashMap<String, UserInfo>>,
    fetch_timeout: Duration,
}

impl Normalizer {
    /// Creates a normalizer fetching through `client`.
    pub fn new(client: BoxedClient, cache_ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            client,
            users: TtlCache::new(cache_ttl),
            conversations: TtlCache::new(cache_ttl),
            bots: Mutex::new(HashMap::new()),
            fetch_timeout,
        }
    }

    /// Normalizes one frame, or returns `None` for frames that do not
    /// produce a message (control frames, unknown types, unattributable
    /// events).
    pub async fn normalize(&self, event: WireEvent) -> Option<Message> {
        let raw = serde_json::to_value(&event).unwrap_or(Value::Null);

        let message = match event {
            WireEvent::Message(frame) => self.normalize_message(frame).await?,
            WireEvent::MemberJoinedChannel { channel, user, ts } => {
                let user = self.resolve_user(&user, &channel).await;
                Message::with_kind(ts.clone(), user, channel, MessageKind::Enter)
                    .with_timestamp(ts)
            }
            WireEvent::MemberLeftChannel { channel, user, ts } => {
                let user = self.resolve_user(&user, &channel).await;
                Message::with_kind(ts.clone(), user, channel, MessageKind::Leave)
                    .with_timestamp(ts)
            }
            WireEvent::ChannelTopic {
                channel,
                user,
                topic,
                ts,
            } => {
                let conversation = self.resolve_conversation(&channel).await;
                let previous_topic = conversation
                    .as_ref()
                    .and_then(|conversation| conversation.topic.clone());
                self.record_topic(conversation, &channel, &topic);
                let user = self.resolve_user(&user, &channel).await;
                Message::with_kind(
                    ts.clone(),
                    user,
                    channel,
                    MessageKind::Topic {
                        new_topic: topic,
                        previous_topic,
                    },
                )
                .with_timestamp(ts)
            }
            WireEvent::ReactionAdded(frame) => {
                self.normalize_reaction(frame, ReactionChange::Added).await
            }
            WireEvent::ReactionRemoved(frame) => {
                self.normalize_reaction(frame, ReactionChange::Removed)
                    .await
            }
            WireEvent::PresenceChange {
                user,
                users,
                presence,
            } => {
                let ids: Vec<String> = if users.is_empty() {
                    user.into_iter().collect()
                } else {
                    users
                };
                if ids.is_empty() {
                    debug!("dropping presence frame with no users");
                    return None;
                }
                let mut resolved = Vec::with_capacity(ids.len());
                for id in &ids {
                    resolved.push(self.resolve_user(id, "").await);
                }
                let state = if presence == "active" {
                    PresenceState::Active
                } else {
                    PresenceState::Away
                };
                let author = resolved[0].clone();
                Message::with_kind(
                    String::new(),
                    author,
                    "",
                    MessageKind::Presence {
                        users: resolved,
                        state,
                    },
                )
            }
            WireEvent::FileShared {
                file_id,
                user_id,
                channel_id,
                event_ts,
            } => {
                let room = channel_id.unwrap_or_default();
                let user = self.resolve_user(&user_id, &room).await;
                Message::with_kind(
                    event_ts.clone(),
                    user,
                    room,
                    MessageKind::FileShared { file_id },
                )
                .with_timestamp(event_ts)
            }
            WireEvent::Error { .. } | WireEvent::Goodbye => return None,
            WireEvent::Unknown => {
                debug!("dropping unmodeled frame");
                return None;
            }
        };

        Some(message.with_raw(raw))
    }

    async fn normalize_message(&self, frame: MessageFrame) -> Option<Message> {
        let user = if let Some(id) = frame.user.as_deref() {
            self.resolve_user(id, &frame.channel).await
        } else if let Some(bot_id) = frame.bot_id.as_deref() {
            self.resolve_bot(bot_id, &frame.channel).await
        } else {
            debug!(channel = %frame.channel, ts = %frame.ts, "dropping message frame with no author");
            return None;
        };

        let mut message = match frame.text {
            Some(text) => Message::text(frame.ts.clone(), user, frame.channel, text),
            None => Message::with_kind(frame.ts.clone(), user, frame.channel, MessageKind::Text),
        };
        message = message.with_timestamp(frame.ts);
        Some(message)
    }

    async fn normalize_reaction(&self, frame: ReactionFrame, change: ReactionChange) -> Message {
        let room = frame.item.room().to_owned();
        let user = self.resolve_user(&frame.user, &room).await;
        let item_user = match frame.item_user.as_deref() {
            Some(id) => Some(self.resolve_user(id, &room).await),
            None => None,
        };
        let item = serde_json::to_value(&frame.item).unwrap_or(Value::Null);
        Message::with_kind(
            frame.event_ts.clone(),
            user,
            room,
            MessageKind::Reaction {
                change,
                name: frame.reaction,
                item,
                item_user,
            },
        )
        .with_timestamp(frame.event_ts)
    }

    /// Resolves a user id to a full user, attributed to `room`.
    ///
    /// Cache hit, then a timed fetch, then a partial-user fallback. The
    /// fallback is cached deliberately not at all, so a later event retries
    /// the lookup.
    pub async fn resolve_user(&self, id: &str, room: &str) -> User {
        if let Some(info) = self.users.get(&id.to_owned()) {
            return info.into_user(room);
        }
        match tokio::time::timeout(self.fetch_timeout, self.client.fetch_user(id)).await {
            Ok(Ok(info)) => {
                self.users.insert(id.to_owned(), info.clone());
                info.into_user(room)
            }
            Ok(Err(e)) => {
                debug!(user = id, error = %e, "user lookup failed, using partial user");
                User::partial(id).in_room(room)
            }
            Err(_) => {
                warn!(user = id, "user lookup timed out, using partial user");
                User::partial(id).in_room(room)
            }
        }
    }

    /// Resolves a bot integration id to the user it posts as. Memoized for
    /// the lifetime of the normalizer.
    pub async fn resolve_bot(&self, bot_id: &str, room: &str) -> User {
        if let Some(info) = self.bots.lock().get(bot_id) {
            return info.clone().into_user(room);
        }
        match tokio::time::timeout(self.fetch_timeout, self.client.fetch_bot(bot_id)).await {
            Ok(Ok(info)) => {
                self.bots.lock().insert(bot_id.to_owned(), info.clone());
                info.into_user(room)
            }
            Ok(Err(e)) => {
                debug!(bot = bot_id, error = %e, "bot lookup failed, using partial user");
                User::partial(bot_id).in_room(room)
            }
            Err(_) => {
                warn!(bot = bot_id, "bot lookup timed out, using partial user");
                User::partial(bot_id).in_room(room)
            }
        }
    }

    /// Resolves conversation metadata: cache hit, then a timed fetch.
    ///
    /// A failed or expired lookup returns `None`; topic history simply
    /// starts from the current event in that case.
    async fn resolve_conversation(&self, id: &str) -> Option<ConversationInfo> {
        if let Some(info) = self.conversations.get(&id.to_owned()) {
            return Some(info);
        }
        match tokio::time::timeout(self.fetch_timeout, self.client.fetch_conversation(id)).await {
            Ok(Ok(info)) => {
                self.conversations.insert(id.to_owned(), info.clone());
                Some(info)
            }
            Ok(Err(e)) => {
                debug!(conversation = id, error = %e, "conversation lookup failed");
                None
            }
            Err(_) => {
                warn!(conversation = id, "conversation lookup timed out");
                None
            }
        }
    }

    /// Writes the new topic back so the next change reports this one as
    /// previous.
    fn record_topic(&self, conversation: Option<ConversationInfo>, channel: &str, topic: &str) {
        let mut info = conversation.unwrap_or_else(|| ConversationInfo {
            id: channel.to_owned(),
            name: String::new(),
            is_im: false,
            topic: None,
        });
        info.topic = Some(topic.to_owned());
        self.conversations.insert(channel.to_owned(), info);
    }

    /// Pre-populates the user cache, as after a directory load.
    pub fn remember_users(&self, users: impl IntoIterator<Item = UserInfo>) {
        for info in users {
            self.users.insert(info.id.clone(), info);
        }
    }
}
