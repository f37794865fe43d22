//! Canonical message model for the Courier framework.
//!
//! Every inbound chat event, regardless of its source platform, is normalized
//! by an adapter into a [`Message`]. The message carries a platform-agnostic
//! envelope (id, user, room, optional text, timestamp) plus a [`MessageKind`]
//! variant with the event-specific payload. Listeners filter on the
//! [`MessageType`] discriminant and match against the message text.
//!
//! A deep class hierarchy of event subtypes maps here to a single tagged
//! union, so the matcher can branch exhaustively without downcasting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// User
// ============================================================================

/// A chat participant as seen by the dispatch core.
///
/// Identity is the `id` field. The `room` field is *not* a durable property
/// of the user: adapters overwrite it per event to reflect the conversation
/// the current event occurred in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Platform-assigned stable identifier.
    pub id: String,
    /// Display name. May be empty when enrichment fell back to a partial user.
    #[serde(default)]
    pub name: String,
    /// The conversation the current event occurred in.
    #[serde(default)]
    pub room: String,
    /// Additional platform attributes (email, tz, profile fields, ...).
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl User {
    /// Creates a user with the given id and name and no further attributes.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            room: String::new(),
            attributes: HashMap::new(),
        }
    }

    /// Creates a partial user carrying only an id.
    ///
    /// Used as the enrichment fallback when a platform lookup fails: dispatch
    /// proceeds with whatever identity information the raw event carried.
    pub fn partial(id: impl Into<String>) -> Self {
        Self::new(id, "")
    }

    /// Returns a copy attributed to the given room.
    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = room.into();
        self
    }
}

// ============================================================================
// Message variants
// ============================================================================

/// Whether a reaction was added to or removed from an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionChange {
    Added,
    Removed,
}

/// Presence state reported by a presence event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Active,
    Away,
}

/// Event-specific payload of a [`Message`].
#[derive(Debug, Clone)]
pub enum MessageKind {
    /// An ordinary text message.
    Text,
    /// A user entered the room.
    Enter,
    /// A user left the room.
    Leave,
    /// The room topic changed.
    Topic {
        new_topic: String,
        previous_topic: Option<String>,
    },
    /// A reaction was added to or removed from an item.
    Reaction {
        change: ReactionChange,
        /// The reaction name (e.g. `thumbsup`).
        name: String,
        /// The raw item the reaction targets.
        item: Value,
        /// Author of the target item, when resolvable.
        item_user: Option<User>,
    },
    /// One or more users changed presence. Presence carries no single room.
    Presence {
        users: Vec<User>,
        state: PresenceState,
    },
    /// A file was shared.
    FileShared { file_id: String },
    /// Fallback wrapper dispatched to catch-all listeners when no ordinary
    /// listener matched the wrapped message.
    CatchAll { wrapped: Box<Message> },
}

/// Discriminant of [`MessageKind`], used by listeners to filter on event type
/// without inspecting the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Text,
    Enter,
    Leave,
    Topic,
    Reaction,
    Presence,
    FileShared,
    CatchAll,
}

// ============================================================================
// Message
// ============================================================================

/// The platform-independent representation of a chat event.
///
/// Every message has a non-empty `room` attribution except where the source
/// event is platform-global (a reaction or file event on a non-conversation
/// item), in which case `room` is the empty string by convention. Empty-room
/// messages still flow through matching, but are undeliverable: a send
/// addressed to an empty room is rejected by the response layer.
#[derive(Debug, Clone)]
pub struct Message {
    /// Platform-assigned event identifier.
    pub id: String,
    /// The user the event is attributed to.
    pub user: User,
    /// Conversation id, or `""` for platform-global events.
    pub room: String,
    /// Text content, when the event carries any.
    pub text: Option<String>,
    /// The raw platform payload the message was normalized from.
    pub raw: Value,
    /// Platform-native timestamp.
    pub timestamp: String,
    /// Event-specific payload.
    pub kind: MessageKind,
}

impl Message {
    /// Creates a text message.
    pub fn text(
        id: impl Into<String>,
        user: User,
        room: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let room = room.into();
        Self {
            id: id.into(),
            user: user.in_room(room.clone()),
            room,
            text: Some(text.into()),
            raw: Value::Null,
            timestamp: String::new(),
            kind: MessageKind::Text,
        }
    }

    /// Creates a message with an explicit kind and no text.
    pub fn with_kind(
        id: impl Into<String>,
        user: User,
        room: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        let room = room.into();
        Self {
            id: id.into(),
            user: user.in_room(room.clone()),
            room,
            text: None,
            raw: Value::Null,
            timestamp: String::new(),
            kind,
        }
    }

    /// Attaches the raw platform payload.
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    /// Attaches the platform-native timestamp.
    pub fn with_timestamp(mut self, ts: impl Into<String>) -> Self {
        self.timestamp = ts.into();
        self
    }

    /// Returns the discriminant of this message's kind.
    pub fn message_type(&self) -> MessageType {
        match self.kind {
            MessageKind::Text => MessageType::Text,
            MessageKind::Enter => MessageType::Enter,
            MessageKind::Leave => MessageType::Leave,
            MessageKind::Topic { .. } => MessageType::Topic,
            MessageKind::Reaction { .. } => MessageType::Reaction,
            MessageKind::Presence { .. } => MessageType::Presence,
            MessageKind::FileShared { .. } => MessageType::FileShared,
            MessageKind::CatchAll { .. } => MessageType::CatchAll,
        }
    }

    /// Returns the text content, or `""` for non-text events.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Wraps this message for dispatch to the catch-all chain.
    pub fn into_catch_all(self) -> Message {
        Message {
            id: self.id.clone(),
            user: self.user.clone(),
            room: self.room.clone(),
            text: self.text.clone(),
            raw: self.raw.clone(),
            timestamp: self.timestamp.clone(),
            kind: MessageKind::CatchAll {
                wrapped: Box::new(self),
            },
        }
    }

    /// Builds the envelope identifying where a response to this message goes.
    pub fn envelope(&self) -> Envelope {
        Envelope {
            room: self.room.clone(),
            user: self.user.clone(),
            message_id: self.id.clone(),
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// The room/user/message triple identifying where and to whom a response is
/// addressed.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Target conversation id.
    pub room: String,
    /// The user being responded to.
    pub user: User,
    /// Id of the message being responded to.
    pub message_id: String,
}

impl Envelope {
    /// Returns true if this envelope cannot be delivered (no room attribution).
    pub fn is_undeliverable(&self) -> bool {
        self.room.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_attributes_user_to_room() {
        let msg = Message::text("1", User::new("U1", "alice"), "C1", "hello");
        assert_eq!(msg.room, "C1");
        assert_eq!(msg.user.room, "C1");
        assert_eq!(msg.text_or_empty(), "hello");
        assert_eq!(msg.message_type(), MessageType::Text);
    }

    #[test]
    fn catch_all_wraps_original() {
        let msg = Message::text("1", User::new("U1", "alice"), "C1", "hello");
        let wrapped = msg.into_catch_all();
        assert_eq!(wrapped.message_type(), MessageType::CatchAll);
        // Text and envelope survive the wrap so catch-all listeners can reply.
        assert_eq!(wrapped.text_or_empty(), "hello");
        assert_eq!(wrapped.envelope().room, "C1");
        match wrapped.kind {
            MessageKind::CatchAll { wrapped: inner } => {
                assert_eq!(inner.message_type(), MessageType::Text);
            }
            _ => panic!("expected catch-all"),
        }
    }

    #[test]
    fn empty_room_is_undeliverable() {
        let msg = Message::with_kind(
            "2",
            User::partial("U2"),
            "",
            MessageKind::FileShared {
                file_id: "F1".into(),
            },
        );
        assert!(msg.envelope().is_undeliverable());
    }
}
