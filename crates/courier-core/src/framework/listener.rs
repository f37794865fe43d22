//! Listener registry and matching.
//!
//! A listener is a (matcher, callback) pair held as a value in the
//! [`Registry`]. There is no implicit broadcast: the dispatch loop walks the
//! registry in registration order and evaluates each listener against the
//! message. All matching listeners fire; first-match-wins is *not* assumed.
//!
//! Two text-trigger kinds exist:
//!
//! - **hear** matches the message text unconditionally.
//! - **respond** matches only text addressed to the robot by name or alias
//!   (case-insensitively, with optional `@` prefix and `:`/`,` punctuation).
//!
//! Non-text events (enter, leave, topic, reaction, presence, file) use
//! kind-filtered listeners, and custom matchers can be registered through
//! [`Listener::custom`]. Listeners whose matcher targets the catch-all
//! variant live in a separate chain consulted only when nothing else
//! matched.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;

use crate::foundation::message::{Message, MessageType};
use crate::framework::response::Response;

/// Error type callbacks may fail with.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a listener callback.
pub type CallbackResult = Result<(), CallbackError>;

/// A type-erased listener callback.
pub type Callback = Arc<dyn Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync>;

/// A type-erased matcher predicate.
pub type MatcherFn = Arc<dyn Fn(&Message) -> Option<MatchResult> + Send + Sync>;

/// Captured groups produced by a successful match.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// The full matched text.
    pub matched: String,
    /// Capture groups; index 0 is the full match.
    pub captures: Vec<Option<String>>,
}

impl MatchResult {
    /// Materializes regex captures into an owned result.
    pub fn from_captures(caps: &regex::Captures<'_>) -> Self {
        Self {
            matched: caps.get(0).map(|m| m.as_str().to_owned()).unwrap_or_default(),
            captures: (0..caps.len())
                .map(|i| caps.get(i).map(|m| m.as_str().to_owned()))
                .collect(),
        }
    }

    /// Returns capture group `index`, if it participated in the match.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.captures.get(index).and_then(|c| c.as_deref())
    }
}

/// Identity and options of a listener, exposed to listener middleware.
#[derive(Debug, Clone)]
pub struct ListenerInfo {
    /// Listener name, used in logs and error reports.
    pub name: String,
    /// Free-form options attached at registration time.
    pub options: HashMap<String, Value>,
}

// ============================================================================
// Listener
// ============================================================================

/// A registered (predicate, callback) pair.
pub struct Listener {
    info: ListenerInfo,
    /// Type discriminator; messages of other kinds are skipped without
    /// evaluating the matcher.
    message_type: Option<MessageType>,
    matcher: MatcherFn,
    callback: Callback,
}

impl Listener {
    /// Creates a listener with a custom matcher and no type filter.
    ///
    /// This is the `listen` primitive every other constructor builds on;
    /// adapters can register additional listener kinds through it instead of
    /// extending the robot type.
    pub fn custom<M, F>(name: impl Into<String>, matcher: M, callback: F) -> Self
    where
        M: Fn(&Message) -> Option<MatchResult> + Send + Sync + 'static,
        F: Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync + 'static,
    {
        Self {
            info: ListenerInfo {
                name: name.into(),
                options: HashMap::new(),
            },
            message_type: None,
            matcher: Arc::new(matcher),
            callback: Arc::new(callback),
        }
    }

    /// Creates a listener matching text messages against `pattern`.
    pub fn hear<F>(pattern: &str, callback: F) -> Result<Self, regex::Error>
    where
        F: Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync + 'static,
    {
        let regex = Regex::new(pattern)?;
        Ok(Self::custom(
            format!("hear:{pattern}"),
            move |msg: &Message| {
                regex
                    .captures(msg.text_or_empty())
                    .map(|caps| MatchResult::from_captures(&caps))
            },
            callback,
        )
        .for_type(MessageType::Text))
    }

    /// Creates a listener matching text addressed to the robot.
    ///
    /// The pattern matches only when the text begins with the robot's name
    /// or alias, case-insensitively, optionally prefixed with `@` and
    /// followed by `:` or `,` punctuation. Capture group numbering of the
    /// caller's pattern is preserved.
    pub fn respond<F>(
        robot_name: &str,
        alias: Option<&str>,
        pattern: &str,
        callback: F,
    ) -> Result<Self, regex::Error>
    where
        F: Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync + 'static,
    {
        let regex = Regex::new(&respond_pattern(robot_name, alias, pattern))?;
        Ok(Self::custom(
            format!("respond:{pattern}"),
            move |msg: &Message| {
                regex
                    .captures(msg.text_or_empty())
                    .map(|caps| MatchResult::from_captures(&caps))
            },
            callback,
        )
        .for_type(MessageType::Text))
    }

    /// Creates a listener firing for every message of the given kind.
    pub fn on_kind<F>(kind: MessageType, callback: F) -> Self
    where
        F: Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync + 'static,
    {
        Self::custom(
            format!("on:{kind:?}"),
            |_msg: &Message| Some(MatchResult::default()),
            callback,
        )
        .for_type(kind)
    }

    /// Creates a catch-all listener, fired only when no other listener
    /// matched the message.
    pub fn catch_all<F>(callback: F) -> Self
    where
        F: Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync + 'static,
    {
        Self::on_kind(MessageType::CatchAll, callback)
    }

    /// Restricts this listener to messages of one kind.
    pub fn for_type(mut self, kind: MessageType) -> Self {
        self.message_type = Some(kind);
        self
    }

    /// Sets the listener name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.info.name = name.into();
        self
    }

    /// Attaches a registration option.
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.info.options.insert(key.into(), value);
        self
    }

    /// Listener identity and options.
    pub fn info(&self) -> &ListenerInfo {
        &self.info
    }

    /// Returns true if this listener targets the catch-all chain.
    pub fn is_catch_all(&self) -> bool {
        self.message_type == Some(MessageType::CatchAll)
    }

    /// Evaluates the matcher against a message.
    ///
    /// Returns `Ok(None)` when the type filter or matcher rejects the
    /// message, and `Err` with the panic detail when the matcher panicked.
    /// A panicking matcher is isolated: the caller logs it and continues
    /// with the next listener.
    pub fn try_match(&self, msg: &Message) -> Result<Option<MatchResult>, String> {
        if let Some(kind) = self.message_type
            && msg.message_type() != kind
        {
            return Ok(None);
        }
        let matcher = Arc::clone(&self.matcher);
        catch_unwind(AssertUnwindSafe(|| matcher(msg))).map_err(panic_detail)
    }

    /// The callback to invoke on a match.
    pub fn callback(&self) -> Callback {
        Arc::clone(&self.callback)
    }
}

/// Builds the anchored respond pattern for a robot name and optional alias.
fn respond_pattern(robot_name: &str, alias: Option<&str>, pattern: &str) -> String {
    let mut names = Vec::with_capacity(2);
    if let Some(alias) = alias {
        names.push(regex::escape(alias));
    }
    names.push(regex::escape(robot_name));
    // Longer alternation first so an alias that prefixes the name still wins.
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));
    format!(r"^\s*@?(?i:{})[:,]?\s*(?:{})", names.join("|"), pattern)
}

/// Renders a panic payload as a string for error reports.
pub(crate) fn panic_detail(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Insertion-ordered listener registry.
///
/// The ordinary chain and the catch-all chain are kept separate; the
/// dispatcher consults the catch-all chain only when no ordinary listener
/// matched. Registration is synchronized so scripts may register while the
/// dispatch loop is iterating a snapshot.
#[derive(Default)]
pub struct Registry {
    listeners: RwLock<Vec<Arc<Listener>>>,
    catch_all: RwLock<Vec<Arc<Listener>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener at the tail of its chain.
    pub fn register(&self, listener: Listener) {
        let listener = Arc::new(listener);
        if listener.is_catch_all() {
            self.catch_all.write().push(listener);
        } else {
            self.listeners.write().push(listener);
        }
    }

    /// Snapshot of the ordinary chain, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Listener>> {
        self.listeners.read().clone()
    }

    /// Snapshot of the catch-all chain, in registration order.
    pub fn catch_all_snapshot(&self) -> Vec<Arc<Listener>> {
        self.catch_all.read().clone()
    }

    /// Number of ordinary listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns true if no ordinary listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::message::{MessageKind, User};

    fn noop() -> impl Fn(Response) -> BoxFuture<'static, CallbackResult> + Send + Sync {
        |_res| Box::pin(async { Ok(()) })
    }

    fn text(t: &str) -> Message {
        Message::text("1", User::new("U1", "alice"), "C1", t)
    }

    #[test]
    fn hear_matches_anywhere_in_text() {
        let listener = Listener::hear(r"hello", noop()).unwrap();
        assert!(listener.try_match(&text("hello")).unwrap().is_some());
        assert!(listener.try_match(&text("well hello there")).unwrap().is_some());
        assert!(listener.try_match(&text("goodbye")).unwrap().is_none());
    }

    #[test]
    fn respond_requires_addressing() {
        let listener = Listener::respond("courier", None, r"helo", noop()).unwrap();
        assert!(listener.try_match(&text("courier: helo")).unwrap().is_some());
        assert!(listener.try_match(&text("courier helo")).unwrap().is_some());
        assert!(listener.try_match(&text("@courier helo")).unwrap().is_some());
        assert!(listener.try_match(&text("COURIER, helo")).unwrap().is_some());
        assert!(listener.try_match(&text("helo")).unwrap().is_none());
        assert!(listener.try_match(&text("hey courier: helo")).unwrap().is_none());
    }

    #[test]
    fn respond_accepts_alias() {
        let listener = Listener::respond("courier", Some("/"), r"deploy", noop()).unwrap();
        assert!(listener.try_match(&text("/deploy")).unwrap().is_some());
        assert!(listener.try_match(&text("courier deploy")).unwrap().is_some());
        assert!(listener.try_match(&text("deploy")).unwrap().is_none());
    }

    #[test]
    fn respond_preserves_capture_groups() {
        let listener =
            Listener::respond("courier", None, r"remember (\S+) is (.*)", noop()).unwrap();
        let result = listener
            .try_match(&text("courier: remember door is locked"))
            .unwrap()
            .unwrap();
        assert_eq!(result.get(1), Some("door"));
        assert_eq!(result.get(2), Some("locked"));
    }

    #[test]
    fn hear_skips_non_text_messages() {
        let listener = Listener::hear(r".*", noop()).unwrap();
        let enter = Message::with_kind("1", User::new("U1", "alice"), "C1", MessageKind::Enter);
        assert!(listener.try_match(&enter).unwrap().is_none());
    }

    #[test]
    fn kind_listener_fires_for_its_kind_only() {
        let listener = Listener::on_kind(MessageType::Enter, noop());
        let enter = Message::with_kind("1", User::new("U1", "alice"), "C1", MessageKind::Enter);
        assert!(listener.try_match(&enter).unwrap().is_some());
        assert!(listener.try_match(&text("hi")).unwrap().is_none());
    }

    #[test]
    fn panicking_matcher_is_reported_not_propagated() {
        let listener = Listener::custom(
            "explosive",
            |_msg: &Message| panic!("matcher exploded"),
            noop(),
        );
        let err = listener.try_match(&text("hi")).unwrap_err();
        assert!(err.contains("matcher exploded"));
    }

    #[test]
    fn registry_keeps_registration_order() {
        let registry = Registry::new();
        registry.register(Listener::hear("a", noop()).unwrap());
        registry.register(Listener::hear("b", noop()).unwrap());
        registry.register(Listener::catch_all(noop()));

        let names: Vec<String> = registry
            .snapshot()
            .iter()
            .map(|l| l.info().name.clone())
            .collect();
        assert_eq!(names, ["hear:a", "hear:b"]);
        assert_eq!(registry.catch_all_snapshot().len(), 1);
    }
}
