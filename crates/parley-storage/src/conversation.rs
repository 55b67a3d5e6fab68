//! Conversation store: persists and restores the message log.
//!
//! Read and write failures never reach the caller. A blob that cannot be
//! read or parsed is reported as "nothing stored" so the session seeds a
//! fresh greeting; a failed write leaves the conversation in memory only.

use std::sync::Arc;

use tracing::{debug, warn};

use parley_core::error::{ParleyError, Result};
use parley_core::types::ConversationLog;

use crate::medium::KeyValueStore;

/// Loads, saves, and clears conversation logs on a persistence medium.
#[derive(Clone)]
pub struct ConversationStore {
    medium: Arc<dyn KeyValueStore>,
}

impl ConversationStore {
    pub fn new(medium: Arc<dyn KeyValueStore>) -> Self {
        Self { medium }
    }

    /// Restore the log stored under `key`.
    ///
    /// Returns `None` when nothing is stored, and also when the stored value
    /// is unreadable or malformed (the fault is logged).
    pub fn load(&self, key: &str) -> Option<ConversationLog> {
        match self.try_load(key) {
            Ok(log) => log,
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable conversation log");
                None
            }
        }
    }

    /// Persist the full log under `key`.
    ///
    /// An empty log is never written, so a prior session is not clobbered by
    /// an empty state during start-up.
    pub fn save(&self, key: &str, log: &ConversationLog) {
        if log.is_empty() {
            debug!(key = %key, "Skipping save of empty conversation log");
            return;
        }
        if let Err(e) = self.try_save(key, log) {
            warn!(key = %key, error = %e, "Failed to persist conversation log");
        }
    }

    /// Remove the persisted log. In-memory state is the caller's concern.
    pub fn clear(&self, key: &str) {
        if let Err(e) = self.medium.remove(key) {
            warn!(key = %key, error = %e, "Failed to clear conversation log");
        }
    }

    fn try_load(&self, key: &str) -> Result<Option<ConversationLog>> {
        let Some(raw) = self
            .medium
            .get(key)
            .map_err(|e| ParleyError::PersistenceRead(e.to_string()))?
        else {
            return Ok(None);
        };

        let log: ConversationLog = serde_json::from_str(&raw)
            .map_err(|e| ParleyError::PersistenceRead(format!("malformed log: {}", e)))?;
        debug!(key = %key, messages = log.len(), "Conversation log restored");
        Ok(Some(log))
    }

    fn try_save(&self, key: &str, log: &ConversationLog) -> Result<()> {
        let raw = serde_json::to_string(log)
            .map_err(|e| ParleyError::PersistenceWrite(e.to_string()))?;
        self.medium
            .set(key, &raw)
            .map_err(|e| ParleyError::PersistenceWrite(e.to_string()))
    }
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore").finish()
    }
}
