//! Local session store
//!
//! Holds the full session collection under one key and the message list of
//! the currently open session under a second key. The active-history slot
//! is a write cache for the open session; the collection stays the source
//! of truth and the synchronizer keeps both consistent.

use super::{schema, StorageBackend, ACTIVE_HISTORY_KEY, SESSIONS_KEY};
use crate::error::Result;
use crate::session::{ChatMessage, ChatSession};
use metrics::increment_counter;
use std::sync::Arc;

/// Durable store for the session collection and the active-history slot
#[derive(Clone)]
pub struct LocalSessionStore {
    backend: Arc<dyn StorageBackend>,
}

impl LocalSessionStore {
    /// Create a store on top of the given backend
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// The underlying backend
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Read every persisted session
    ///
    /// A blob that fails validation is logged and read as empty. Only a
    /// failure of the storage medium itself is returned as an error.
    pub fn load_all(&self) -> Result<Vec<ChatSession>> {
        let Some(raw) = self.backend.get(SESSIONS_KEY)? else {
            return Ok(Vec::new());
        };
        match schema::parse_sessions(&raw) {
            Ok(sessions) => {
                tracing::debug!("Loaded {} sessions from local store", sessions.len());
                Ok(sessions)
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable session collection: {}", e);
                increment_counter!("quire_schema_drops_total", "slot" => "sessions");
                Ok(Vec::new())
            }
        }
    }

    /// Write the full collection
    ///
    /// An empty collection is never written, so an initialization race
    /// cannot clobber a populated store. Returns whether a write happened.
    pub fn persist_all(&self, sessions: &[ChatSession]) -> Result<bool> {
        if sessions.is_empty() {
            tracing::debug!("Skipping persist of empty session collection");
            return Ok(false);
        }
        let raw = serde_json::to_string(sessions)?;
        self.backend.set(SESSIONS_KEY, &raw)?;
        Ok(true)
    }

    /// Remove the session collection key
    pub fn clear_sessions(&self) -> Result<()> {
        self.backend.remove(SESSIONS_KEY)
    }

    /// Read the active-history slot
    pub fn load_active_history(&self) -> Result<Vec<ChatMessage>> {
        let Some(raw) = self.backend.get(ACTIVE_HISTORY_KEY)? else {
            return Ok(Vec::new());
        };
        match schema::parse_messages(&raw) {
            Ok(messages) => Ok(messages),
            Err(e) => {
                tracing::warn!("Discarding unreadable active history: {}", e);
                increment_counter!("quire_schema_drops_total", "slot" => "active_history");
                Ok(Vec::new())
            }
        }
    }

    /// Overwrite the active-history slot
    pub fn save_active_history(&self, messages: &[ChatMessage]) -> Result<()> {
        let raw = serde_json::to_string(messages)?;
        self.backend.set(ACTIVE_HISTORY_KEY, &raw)
    }

    /// Remove the active-history slot
    pub fn clear_active_history(&self) -> Result<()> {
        self.backend.remove(ACTIVE_HISTORY_KEY)
    }

    /// Remove both the collection and the active-history slot
    pub fn clear_all(&self) -> Result<()> {
        self.clear_sessions()?;
        self.clear_active_history()
    }
}
