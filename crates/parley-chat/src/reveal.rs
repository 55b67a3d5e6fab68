//! Progressive reveal of bot replies.
//!
//! A reply is revealed one character per tick. Each message animates at most
//! once per session: the scheduler remembers which messages it has started,
//! and anything final or already started is shown in full straight away.

use std::collections::HashSet;

use tokio::sync::mpsc;

use parley_core::types::{Message, MessageId};

/// Growing prefixes of a text, one more character each step.
///
/// Prefixes end on char boundaries, so multi-byte characters are never split.
#[derive(Debug, Clone)]
pub struct RevealFrames {
    text: String,
    ends: Vec<usize>,
    next: usize,
}

impl RevealFrames {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let ends = text
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .collect();
        Self {
            text,
            ends,
            next: 0,
        }
    }

    pub fn full_text(&self) -> &str {
        &self.text
    }

    /// Number of frames the reveal takes in total.
    pub fn frame_count(&self) -> usize {
        self.ends.len()
    }
}

impl Iterator for RevealFrames {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let end = *self.ends.get(self.next)?;
        self.next += 1;
        Some(self.text[..end].to_string())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.ends.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RevealFrames {}

/// How a message should be displayed.
#[derive(Debug, Clone)]
pub enum Reveal {
    /// Show the full text at once.
    Immediate(String),
    /// Play the frames, then show the full text.
    Animated(RevealFrames),
}

impl Reveal {
    pub fn is_animated(&self) -> bool {
        matches!(self, Reveal::Animated(_))
    }

    pub fn final_text(&self) -> &str {
        match self {
            Reveal::Immediate(text) => text,
            Reveal::Animated(frames) => frames.full_text(),
        }
    }
}

/// Tracks which messages have already been animated.
#[derive(Debug, Default)]
pub struct RevealScheduler {
    animated: HashSet<MessageId>,
}

impl RevealScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide how to display `message`, recording the animation if one starts.
    pub fn begin(&mut self, message: &Message) -> Reveal {
        if message.is_final() || self.animated.contains(&message.id) {
            return Reveal::Immediate(message.text.clone());
        }
        self.animated.insert(message.id.clone());
        Reveal::Animated(RevealFrames::new(message.text.clone()))
    }

    pub fn has_animated(&self, id: &MessageId) -> bool {
        self.animated.contains(id)
    }

    pub fn forget_all(&mut self) {
        self.animated.clear();
    }
}

/// One update delivered to the presentation layer during a reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealFrame {
    /// Partial text to display.
    Partial(String),
    /// The full text; the reveal is over. Delivered exactly once.
    Complete(String),
}

/// Receiving end of a running reveal.
///
/// Dropping the stream stops the ticker; the message then stays unsettled
/// until it is displayed again (which shows it in full).
#[derive(Debug)]
pub struct RevealStream {
    id: MessageId,
    rx: mpsc::UnboundedReceiver<RevealFrame>,
}

impl RevealStream {
    pub(crate) fn new(id: MessageId, rx: mpsc::UnboundedReceiver<RevealFrame>) -> Self {
        Self { id, rx }
    }

    pub fn message_id(&self) -> &MessageId {
        &self.id
    }

    /// Next frame, or `None` once the reveal is over or was cancelled.
    pub async fn next_frame(&mut self) -> Option<RevealFrame> {
        self.rx.recv().await
    }
}
