//! Chat session controller.
//!
//! Owns one conversation keyed by its storage key. The controller is either
//! `Idle` or `AwaitingReply`; a send while awaiting is dropped, so at most one
//! reply timer is ever outstanding. Every log mutation is persisted through
//! the [`ConversationStore`] and published as a [`ChatEvent`].
//!
//! Timers (the reply delay and the reveal tickers) are owned by the session
//! and cancelled by `clear_messages`, `close`, or dropping the session.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use parley_core::config::ParleyConfig;
use parley_core::error::Result;
use parley_core::random::RandomSource;
use parley_core::types::{ConversationLog, Message, MessageId};
use parley_storage::ConversationStore;

use crate::catalog::ResponseCatalog;
use crate::events::ChatEvent;
use crate::matcher::Matcher;
use crate::reveal::{Reveal, RevealFrame, RevealScheduler, RevealStream};
use crate::timer::{self, TimerGuard};

/// Capacity of the event channel. Slow subscribers lag rather than block.
const EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Options and outcomes
// =============================================================================

/// Per-session settings, usually derived from [`ParleyConfig`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub storage_key: String,
    pub show_suggestions: bool,
    pub initial_greeting: Option<String>,
    pub starter_prompts: Vec<String>,
    pub reply_delay_min: Duration,
    pub reply_delay_max: Duration,
    pub tick_interval: Duration,
}

impl SessionOptions {
    pub fn from_config(config: &ParleyConfig) -> Self {
        Self {
            storage_key: config.widget.storage_key.clone(),
            show_suggestions: config.widget.show_suggestions,
            initial_greeting: config.widget.initial_greeting.clone(),
            starter_prompts: config.widget.starter_prompts.clone(),
            reply_delay_min: Duration::from_millis(config.session.reply_delay_min_ms),
            reply_delay_max: Duration::from_millis(config.session.reply_delay_max_ms),
            tick_interval: Duration::from_millis(config.reveal.tick_interval_ms),
        }
    }

    /// Draw a typing delay from `[min, max)` at millisecond resolution.
    pub fn reply_delay(&self, rng: &mut dyn RandomSource) -> Duration {
        let min = self.reply_delay_min.as_millis() as u64;
        let span = self.reply_delay_max.as_millis().saturating_sub(min as u128) as u64;
        let offset = (rng.next() * span as f64).floor() as u64;
        Duration::from_millis(min + offset.min(span.saturating_sub(1)))
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&ParleyConfig::default())
    }
}

/// Controller state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingReply,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::AwaitingReply => write!(f, "awaiting_reply"),
        }
    }
}

/// Result of [`ChatSession::send_message`]. Ignored sends are not errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The user message was appended; a reply is scheduled.
    Accepted(MessageId),
    Ignored(IgnoreReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Empty or whitespace-only text.
    Blank,
    /// A reply is still pending.
    Busy,
    /// The session was closed.
    Closed,
}

/// Everything a renderer needs for one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub messages: Vec<Message>,
    pub is_typing: bool,
}

// =============================================================================
// Session
// =============================================================================

struct SessionInner {
    log: ConversationLog,
    state: SessionState,
    /// Bumped whenever a pending reply must be invalidated.
    generation: u64,
    pending_reply: Option<TimerGuard>,
    tickers: HashMap<MessageId, TimerGuard>,
    reveals: RevealScheduler,
    rng: Box<dyn RandomSource>,
    closed: bool,
}

struct Shared {
    options: SessionOptions,
    matcher: Matcher,
    store: ConversationStore,
    inner: Mutex<SessionInner>,
    events: broadcast::Sender<ChatEvent>,
}

/// One live conversation.
///
/// Timer-driven work (reply delivery, reveal ticking) runs on the tokio
/// runtime, so `send_message` and `play_reveal` must be called from within
/// one.
pub struct ChatSession {
    shared: Arc<Shared>,
}

impl ChatSession {
    /// Mount a session: restore the stored log or seed a greeting.
    ///
    /// Fails only when the catalog does not validate.
    pub fn open(
        options: SessionOptions,
        catalog: Arc<ResponseCatalog>,
        store: ConversationStore,
        mut rng: Box<dyn RandomSource>,
    ) -> Result<Self> {
        let matcher = Matcher::new(catalog)?;

        let log = match store.load(&options.storage_key) {
            Some(log) => {
                info!(
                    key = %options.storage_key,
                    messages = log.len(),
                    "Restored conversation"
                );
                log
            }
            None => {
                let mut log = ConversationLog::new();
                append(&mut log, seed_greeting(&matcher, &options, rng.as_mut()));
                store.save(&options.storage_key, &log);
                info!(key = %options.storage_key, "Started new conversation");
                log
            }
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = SessionInner {
            log,
            state: SessionState::Idle,
            generation: 0,
            pending_reply: None,
            tickers: HashMap::new(),
            reveals: RevealScheduler::new(),
            rng,
            closed: false,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                options,
                matcher,
                store,
                inner: Mutex::new(inner),
                events,
            }),
        })
    }

    pub fn options(&self) -> &SessionOptions {
        &self.shared.options
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.shared.events.subscribe()
    }

    /// Submit user text. Blank text, a pending reply, or a closed session
    /// make this a no-op.
    pub fn send_message(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored(IgnoreReason::Blank);
        }

        let shared = &self.shared;
        let mut inner = shared.lock();
        if inner.closed {
            return SendOutcome::Ignored(IgnoreReason::Closed);
        }
        if inner.state == SessionState::AwaitingReply {
            debug!("Reply pending, ignoring message");
            return SendOutcome::Ignored(IgnoreReason::Busy);
        }

        let message = Message::user(text);
        let id = message.id.clone();
        append(&mut inner.log, message.clone());
        inner.state = SessionState::AwaitingReply;
        inner.generation += 1;

        let generation = inner.generation;
        let delay = shared.options.reply_delay(inner.rng.as_mut());
        let weak = Arc::downgrade(shared);
        let query = text.to_string();
        inner.pending_reply = Some(timer::after(delay, move || {
            if let Some(shared) = weak.upgrade() {
                shared.deliver_reply(generation, &query);
            }
        }));
        debug!(id = %id, delay_ms = delay.as_millis() as u64, "Reply scheduled");

        shared.persist(&inner.log);
        shared.emit(ChatEvent::MessageAppended { message });
        shared.emit(ChatEvent::TypingChanged { is_typing: true });
        SendOutcome::Accepted(id)
    }

    /// Reset to a single fresh greeting, cancelling any pending reply and
    /// running reveal.
    pub fn clear_messages(&self) {
        let shared = &self.shared;
        let mut inner = shared.lock();
        if inner.closed {
            return;
        }

        shared.store.clear(&shared.options.storage_key);
        inner.pending_reply = None;
        inner.tickers.clear();
        inner.reveals.forget_all();
        inner.generation += 1;
        let was_typing = inner.state == SessionState::AwaitingReply;
        inner.state = SessionState::Idle;

        let greeting = seed_greeting(&shared.matcher, &shared.options, inner.rng.as_mut());
        inner.log.clear();
        append(&mut inner.log, greeting.clone());
        shared.persist(&inner.log);
        info!(key = %shared.options.storage_key, "Conversation cleared");

        if was_typing {
            shared.emit(ChatEvent::TypingChanged { is_typing: false });
        }
        shared.emit(ChatEvent::Cleared { greeting });
    }

    /// Flip a revealing message to final, stopping its ticker if one runs.
    ///
    /// Returns `true` when the message changed state.
    pub fn mark_message_settled(&self, id: &MessageId) -> bool {
        let mut inner = self.shared.lock();
        if let Some(ticker) = inner.tickers.remove(id) {
            ticker.cancel();
        }
        self.shared.settle(&mut inner, id)
    }

    /// Start displaying a message.
    ///
    /// A revealing message not yet animated in this session streams partial
    /// frames at the tick interval; anything else yields its full text at
    /// once. The stream always ends with exactly one `Complete` frame unless
    /// it is dropped or the session is cleared first. Returns `None` for an
    /// unknown id or a closed session.
    pub fn play_reveal(&self, id: &MessageId) -> Option<RevealStream> {
        let shared = &self.shared;
        let mut inner = shared.lock();
        if inner.closed {
            return None;
        }
        let message = inner.log.get(id)?.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        match inner.reveals.begin(&message) {
            Reveal::Immediate(text) => {
                if let Some(ticker) = inner.tickers.remove(id) {
                    ticker.cancel();
                }
                shared.settle(&mut inner, id);
                let _ = tx.send(RevealFrame::Complete(text));
            }
            Reveal::Animated(frames) => {
                let full = frames.full_text().to_string();
                let tick = shared.options.tick_interval;
                let weak = Arc::downgrade(shared);
                let ticker_id = id.clone();
                let ticker = timer::spawn(async move {
                    for frame in frames {
                        tokio::time::sleep(tick).await;
                        if tx.send(RevealFrame::Partial(frame)).is_err() {
                            debug!(id = %ticker_id, "Reveal abandoned");
                            return;
                        }
                    }
                    let Some(shared) = weak.upgrade() else {
                        return;
                    };
                    shared.complete_reveal(&ticker_id);
                    let _ = tx.send(RevealFrame::Complete(full));
                });
                inner.tickers.insert(id.clone(), ticker);
            }
        }

        Some(RevealStream::new(id.clone(), rx))
    }

    /// Cancel every timer and refuse further input. Called on drop.
    pub fn close(&self) {
        let mut inner = self.shared.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.pending_reply = None;
        inner.tickers.clear();
        debug!(key = %self.shared.options.storage_key, "Session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn is_typing(&self) -> bool {
        self.state() == SessionState::AwaitingReply
    }

    pub fn messages(&self) -> Vec<Message> {
        self.shared.lock().log.as_slice().to_vec()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        let inner = self.shared.lock();
        ChatSnapshot {
            messages: inner.log.as_slice().to_vec(),
            is_typing: inner.state == SessionState::AwaitingReply,
        }
    }

    /// Follow-up chips to show under the latest message.
    ///
    /// Non-empty only when chips are enabled, the controller is idle, and
    /// the last message is a settled bot message carrying suggestions.
    pub fn visible_suggestions(&self) -> Vec<String> {
        if !self.shared.options.show_suggestions {
            return Vec::new();
        }
        let inner = self.shared.lock();
        if inner.state != SessionState::Idle {
            return Vec::new();
        }
        match inner.log.last() {
            Some(last) if last.is_bot() && last.is_final() => last.suggestions.clone(),
            _ => Vec::new(),
        }
    }

    /// Quick prompts offered while the conversation is empty.
    pub fn starter_prompts(&self) -> Vec<String> {
        let inner = self.shared.lock();
        if inner.log.is_empty() && inner.state == SessionState::Idle {
            self.shared.options.starter_prompts.clone()
        } else {
            Vec::new()
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSession")
            .field("storage_key", &self.shared.options.storage_key)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn persist(&self, log: &ConversationLog) {
        self.store.save(&self.options.storage_key, log);
    }

    /// Reply-timer callback. Stale or cancelled replies are dropped.
    fn deliver_reply(&self, generation: u64, query: &str) {
        let mut inner = self.lock();
        if inner.closed
            || inner.generation != generation
            || inner.state != SessionState::AwaitingReply
        {
            return;
        }

        let reply = self.matcher.find_best_match(query, inner.rng.as_mut());
        let message = Message::bot_reply(reply.reply_text, reply.suggestions);
        append(&mut inner.log, message.clone());
        inner.state = SessionState::Idle;
        if let Some(pending) = inner.pending_reply.take() {
            pending.disarm();
        }
        self.persist(&inner.log);
        debug!(id = %message.id, category = %reply.category, "Reply delivered");

        self.emit(ChatEvent::MessageAppended { message });
        self.emit(ChatEvent::TypingChanged { is_typing: false });
    }

    /// Called by a ticker after its last frame.
    fn complete_reveal(&self, id: &MessageId) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        if let Some(ticker) = inner.tickers.remove(id) {
            ticker.disarm();
        }
        self.settle(&mut inner, id);
    }

    fn settle(&self, inner: &mut SessionInner, id: &MessageId) -> bool {
        if !inner.log.settle(id) {
            return false;
        }
        self.persist(&inner.log);
        self.emit(ChatEvent::MessageSettled { id: id.clone() });
        true
    }
}

/// Push onto the log, reporting an id collision instead of dropping it
/// silently.
fn append(log: &mut ConversationLog, message: Message) -> bool {
    let id = message.id.clone();
    let appended = log.push(message);
    if !appended {
        warn!(id = %id, "Duplicate message id, append rejected");
    }
    appended
}

/// A greeting drawn from the catalog; the configured text, if any, replaces
/// the template's reply but keeps its suggestions.
fn seed_greeting(
    matcher: &Matcher,
    options: &SessionOptions,
    rng: &mut dyn RandomSource,
) -> Message {
    let template = matcher.pick_greeting(rng);
    let text = options
        .initial_greeting
        .clone()
        .unwrap_or_else(|| template.reply_text.clone());
    Message::greeting(text, template.suggestions.clone())
}

// =============================================================================
// Tests
// =============================================================================
