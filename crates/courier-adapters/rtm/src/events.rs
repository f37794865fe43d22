//! Wire-event model for the RTM stream.
//!
//! Frames arrive as JSON objects tagged with a `type` field. Variants the
//! adapter does not model deserialize into [`WireEvent::Unknown`] and are
//! dropped by the normalizer rather than failing the stream.

use serde::{Deserialize, Serialize};

/// One frame of the RTM event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    /// A chat message posted to a conversation.
    Message(MessageFrame),

    /// A user joined a conversation.
    MemberJoinedChannel {
        channel: String,
        user: String,
        #[serde(default)]
        ts: String,
    },

    /// A user left a conversation.
    MemberLeftChannel {
        channel: String,
        user: String,
        #[serde(default)]
        ts: String,
    },

    /// The topic of a conversation changed.
    ChannelTopic {
        channel: String,
        user: String,
        topic: String,
        #[serde(default)]
        ts: String,
    },

    /// A reaction was added to an item.
    ReactionAdded(ReactionFrame),

    /// A reaction was removed from an item.
    ReactionRemoved(ReactionFrame),

    /// One or more users changed presence.
    PresenceChange {
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        users: Vec<String>,
        presence: String,
    },

    /// A file was shared.
    FileShared {
        file_id: String,
        user_id: String,
        #[serde(default)]
        channel_id: Option<String>,
        #[serde(default)]
        event_ts: String,
    },

    /// A non-fatal platform error frame. The stream stays open.
    Error { code: i64, msg: String },

    /// The platform is about to close the stream.
    Goodbye,

    /// Any frame type the adapter does not model.
    #[serde(other)]
    Unknown,
}

/// Payload of a `message` frame.
///
/// Exactly one of `user` and `bot_id` identifies the author; frames with
/// neither are dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageFrame {
    pub channel: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

/// Payload of a `reaction_added` / `reaction_removed` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionFrame {
    pub user: String,
    /// The reaction name (e.g. `thumbsup`).
    pub reaction: String,
    pub item: ReactionItem,
    /// Author of the item reacted to, when the platform reports one.
    #[serde(default)]
    pub item_user: Option<String>,
    #[serde(default)]
    pub event_ts: String,
}

/// The item a reaction targets. Only message items carry a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactionItem {
    /// A message in a conversation.
    Message { channel: String, ts: String },
    /// A file, not tied to any single conversation.
    File { file: String },
    /// Item types without room attribution.
    #[serde(other)]
    Other,
}

impl ReactionItem {
    /// The room the item belongs to, or `""` for non-conversation items.
    pub fn room(&self) -> &str {
        match self {
            ReactionItem::Message { channel, .. } => channel,
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_frame_parses() {
        let frame = r#"{"type":"message","channel":"C1","user":"U1","text":"hello","ts":"1.001"}"#;
        match serde_json::from_str::<WireEvent>(frame).unwrap() {
            WireEvent::Message(m) => {
                assert_eq!(m.channel, "C1");
                assert_eq!(m.user.as_deref(), Some("U1"));
                assert_eq!(m.text.as_deref(), Some("hello"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn reaction_on_message_carries_room() {
        let frame = r#"{
            "type": "reaction_added",
            "user": "U1",
            "reaction": "thumbsup",
            "item": { "type": "message", "channel": "C2", "ts": "1.002" },
            "item_user": "U2",
            "event_ts": "1.003"
        }"#;
        match serde_json::from_str::<WireEvent>(frame).unwrap() {
            WireEvent::ReactionAdded(r) => {
                assert_eq!(r.reaction, "thumbsup");
                assert_eq!(r.item.room(), "C2");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn reaction_on_file_has_no_room() {
        let frame = r#"{
            "type": "reaction_removed",
            "user": "U1",
            "reaction": "eyes",
            "item": { "type": "file", "file": "F1" }
        }"#;
        match serde_json::from_str::<WireEvent>(frame).unwrap() {
            WireEvent::ReactionRemoved(r) => assert_eq!(r.item.room(), ""),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn unknown_frame_types_do_not_fail() {
        let frame = r#"{"type":"user_huddle_changed","user":"U1"}"#;
        assert!(matches!(
            serde_json::from_str::<WireEvent>(frame).unwrap(),
            WireEvent::Unknown
        ));
    }
}
