//! Conversational core for the Parley chat widget.
//!
//! Matches free text against a keyword-scored response catalog, runs the
//! conversation state machine with its simulated typing delay, and reveals
//! bot replies progressively.

pub mod catalog;
pub mod events;
pub mod format;
pub mod matcher;
pub mod reveal;
pub mod session;
pub mod timer;

pub use catalog::{Category, ResponseCatalog, ResponseTemplate};
pub use events::ChatEvent;
pub use matcher::{MatchedReply, Matcher};
pub use reveal::{Reveal, RevealFrame, RevealFrames, RevealScheduler, RevealStream};
pub use session::{
    ChatSession, ChatSnapshot, IgnoreReason, SendOutcome, SessionOptions, SessionState,
};
pub use timer::TimerGuard;
