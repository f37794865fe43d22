//! Client seam between the adapter and the concrete wire protocol.
//!
//! The adapter is written against [`RtmClient`] so the streaming and HTTP
//! plumbing stays out of the dispatch path and tests can drive the adapter
//! with scripted clients.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use courier_core::User;

use crate::events::WireEvent;

/// Errors raised by a client operation.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Establishing the event stream failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The platform rejected or failed an API call.
    #[error("platform call failed: {0}")]
    Platform(String),

    /// An API call exceeded its deadline.
    #[error("platform call timed out")]
    Timeout,

    /// The requested entity does not exist.
    #[error("no such entity: {0}")]
    NotFound(String),
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Identity of the authenticated bot user, resolved during connect.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    /// The bot's platform user id.
    pub user_id: String,
    /// The bot's display name.
    pub name: String,
}

/// One established streaming session.
pub struct RtmSession {
    /// The authenticated identity.
    pub identity: BotIdentity,
    /// Inbound event frames. Closed when the stream ends.
    pub events: mpsc::Receiver<WireEvent>,
}

/// Directory entry returned by user lookups and listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Profile fields carried through to [`User::attributes`].
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl UserInfo {
    /// Converts to a canonical user attributed to `room`.
    pub fn into_user(self, room: &str) -> User {
        User {
            id: self.id,
            name: self.name,
            room: room.to_owned(),
            attributes: self.attributes,
        }
    }
}

/// Conversation metadata returned by [`RtmClient::fetch_conversation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// True for direct-message conversations.
    #[serde(default)]
    pub is_im: bool,
    #[serde(default)]
    pub topic: Option<String>,
}

/// One page of the user directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPage {
    pub members: Vec<UserInfo>,
    /// Cursor for the next page; absent or empty on the last page.
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// The wire-protocol surface the adapter depends on.
///
/// Concrete implementations own reconnecting transports and authentication;
/// everything here is a single logical call.
#[async_trait]
pub trait RtmClient: Send + Sync {
    /// Opens the event stream and resolves the bot identity.
    async fn connect(&self) -> ClientResult<RtmSession>;

    /// Looks up a single user.
    async fn fetch_user(&self, id: &str) -> ClientResult<UserInfo>;

    /// Resolves a bot integration id to the user it posts as.
    async fn fetch_bot(&self, bot_id: &str) -> ClientResult<UserInfo>;

    /// Looks up conversation metadata.
    async fn fetch_conversation(&self, id: &str) -> ClientResult<ConversationInfo>;

    /// Lists one page of the user directory.
    async fn list_users(&self, cursor: Option<&str>, limit: usize) -> ClientResult<UserPage>;

    /// Posts a message to a conversation.
    async fn post_message(&self, room: &str, text: &str) -> ClientResult<()>;

    /// Sets a conversation topic.
    async fn set_topic(&self, room: &str, topic: &str) -> ClientResult<()>;

    /// Subscribes to presence updates for the given users.
    async fn subscribe_presence(&self, user_ids: &[String]) -> ClientResult<()>;
}

/// A shared client trait object.
pub type BoxedClient = Arc<dyn RtmClient>;
