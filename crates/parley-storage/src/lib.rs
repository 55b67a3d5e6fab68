//! Parley storage crate - key-value persistence media and the conversation store.
//!
//! The conversation log is persisted as one JSON blob per storage key. Media
//! are interchangeable behind [`KeyValueStore`]: a WAL-mode SQLite table for
//! desktop use and a process-local map for tests and ephemeral sessions.

pub mod conversation;
pub mod medium;
pub mod migrations;
pub mod repository;

pub use conversation::ConversationStore;
pub use medium::{KeyValueStore, MemoryStore};
pub use repository::SqliteStore;
