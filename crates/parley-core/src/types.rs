use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Bot => write!(f, "bot"),
        }
    }
}

/// Whether a message still has its progressive reveal ahead of it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealState {
    /// Rendered in full; never animated again.
    #[default]
    Final,
    /// Freshly appended bot reply waiting for (or in the middle of) its reveal.
    Revealing,
}

/// Persistence medium backing the conversation store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

// =============================================================================
// MessageId
// =============================================================================

/// Identifier of a message within one conversation log.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Fixed id of the greeting seeded into an empty conversation.
    pub const GREETING: &'static str = "initial-greeting";

    /// Fresh id for a message from the given sender.
    pub fn generate(sender: Sender) -> Self {
        Self(format!("{}-{}", sender, Uuid::new_v4()))
    }

    pub fn greeting() -> Self {
        Self(Self::GREETING.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Message
// =============================================================================

/// One entry of the conversation log.
///
/// Serialized with camelCase keys; `createdAt` is RFC 3339 so it survives a
/// round trip through the persistence medium.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reveal_state: RevealState,
    /// Follow-up chips. Only ever populated on bot messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl Message {
    /// A user message. User messages are always final and carry no chips.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(Sender::User),
            text: text.into(),
            sender: Sender::User,
            created_at: Utc::now(),
            reveal_state: RevealState::Final,
            suggestions: Vec::new(),
        }
    }

    /// A matched bot reply, queued for progressive reveal.
    pub fn bot_reply(text: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self {
            id: MessageId::generate(Sender::Bot),
            text: text.into(),
            sender: Sender::Bot,
            created_at: Utc::now(),
            reveal_state: RevealState::Revealing,
            suggestions,
        }
    }

    /// The greeting that opens a fresh conversation. Greetings do not animate.
    pub fn greeting(text: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self {
            id: MessageId::greeting(),
            text: text.into(),
            sender: Sender::Bot,
            created_at: Utc::now(),
            reveal_state: RevealState::Final,
            suggestions,
        }
    }

    pub fn is_bot(&self) -> bool {
        self.sender == Sender::Bot
    }

    pub fn is_final(&self) -> bool {
        self.reveal_state == RevealState::Final
    }
}

// =============================================================================
// ConversationLog
// =============================================================================

/// Insertion-ordered message log with unique ids.
///
/// Deserializing a log that repeats an id fails, so a corrupted snapshot is
/// rejected as a whole rather than partially restored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Message>", into = "Vec<Message>")]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. Returns `false` (and leaves the log untouched) if a
    /// message with the same id is already present.
    pub fn push(&mut self, message: Message) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Flip a revealing message to final.
    ///
    /// Returns `true` only when the state actually changed.
    pub fn settle(&mut self, id: &MessageId) -> bool {
        match self.messages.iter_mut().find(|m| &m.id == id) {
            Some(m) if m.reveal_state == RevealState::Revealing => {
                m.reveal_state = RevealState::Final;
                true
            }
            _ => false,
        }
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl TryFrom<Vec<Message>> for ConversationLog {
    type Error = String;

    fn try_from(messages: Vec<Message>) -> Result<Self, Self::Error> {
        let mut seen = HashSet::with_capacity(messages.len());
        for m in &messages {
            if !seen.insert(&m.id) {
                return Err(format!("duplicate message id: {}", m.id));
            }
        }
        Ok(Self { messages })
    }
}

impl From<ConversationLog> for Vec<Message> {
    fn from(log: ConversationLog) -> Self {
        log.messages
    }
}

impl<'a> IntoIterator for &'a ConversationLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

// =============================================================================
// Tests
// =============================================================================
