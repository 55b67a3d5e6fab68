use serde::Serialize;

use parley_core::types::{Message, MessageId};

/// State changes published by a chat session.
///
/// Consumed by the presentation layer to re-render without polling.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A user or bot message was appended to the log.
    MessageAppended { message: Message },

    /// The assistant started or stopped "typing".
    TypingChanged { is_typing: bool },

    /// A revealing message finished its reveal and is now final.
    MessageSettled { id: MessageId },

    /// The log was reset to a single greeting.
    Cleared { greeting: Message },
}
